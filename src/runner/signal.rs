//! One-shot completion signal between the output reader and the finalizer.

use std::sync::Arc;

use tokio::sync::watch;

/// How the consumer finished with stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Stdout was read to end of stream.
    Drained,
    /// The consumer closed or dropped the stream early.
    Abandoned,
}

/// Single-assignment signal. The first `set` wins, later ones are no-ops.
#[derive(Debug, Clone)]
pub struct CompletionSignal {
    tx: Arc<watch::Sender<Option<Completion>>>,
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionSignal {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Set the signal. Returns `false` if it was already set.
    pub fn set(&self, completion: Completion) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(completion);
            true
        })
    }

    #[must_use]
    pub fn get(&self) -> Option<Completion> {
        *self.tx.borrow()
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.get().is_some()
    }

    /// Wait until the signal is set.
    pub async fn wait(&self) -> Completion {
        let mut rx = self.tx.subscribe();
        let value = rx.wait_for(Option::is_some).await.map(|value| *value);
        // The sender lives as long as `self`, so the channel cannot close here.
        value.ok().flatten().unwrap_or(Completion::Abandoned)
    }
}
