//! Background pipe relays: stdin feeding and stderr capture.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::{CancellationToken, DropGuard};
use tokio_util::task::AbortOnDropHandle;

use crate::process::{PipeReader, PipeWriter};

const CAPTURE_CHUNK: usize = 8 * 1024;

/// Copy `input` into the child's stdin, then close the pipe.
///
/// Both ends are dropped on every path, including a failed copy (usually
/// a broken pipe after the process exited early).
pub async fn relay_stdin(mut input: PipeReader, mut stdin: PipeWriter) -> io::Result<u64> {
    let copied = tokio::io::copy(&mut input, &mut stdin).await;
    let result = match copied {
        Ok(bytes) => stdin.shutdown().await.map(|()| bytes),
        Err(e) => Err(e),
    };
    drop(stdin);
    drop(input);
    result
}

/// Drain `pipe` into memory until end of stream or cancellation.
///
/// Never fails: a read error or cancellation returns what was captured.
pub async fn capture_stderr(mut pipe: PipeReader, cancel: CancellationToken) -> Vec<u8> {
    let mut captured = Vec::new();
    let mut chunk = vec![0u8; CAPTURE_CHUNK];

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                tracing::debug!(bytes = captured.len(), "Stderr capture cancelled");
                break;
            }
            read = pipe.read(&mut chunk) => match read {
                Ok(0) => break,
                Ok(n) => captured.extend_from_slice(&chunk[..n]),
                Err(e) => {
                    tracing::debug!(error = %e, "Stderr read failed, keeping partial capture");
                    break;
                }
            }
        }
    }

    captured
}

/// A running stdin relay, aborted if dropped before being joined.
pub struct StdinRelay {
    task: AbortOnDropHandle<io::Result<u64>>,
}

impl StdinRelay {
    #[must_use]
    pub fn spawn(input: PipeReader, stdin: PipeWriter) -> Self {
        Self {
            task: AbortOnDropHandle::new(tokio::spawn(relay_stdin(input, stdin))),
        }
    }

    /// Wait up to `grace` for the relay to finish and return its error.
    ///
    /// A relay still running after `grace` is aborted and reported as
    /// timed out.
    pub async fn join(self, grace: Duration) -> Option<io::Error> {
        let mut task = self.task;
        let joined = match tokio::time::timeout(grace, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                task.abort();
                return Some(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "stdin relay did not finish after the process exited",
                ));
            }
        };

        match joined {
            Ok(Ok(bytes)) => {
                tracing::debug!(bytes, "Stdin relay finished");
                None
            }
            Ok(Err(e)) => Some(e),
            Err(e) => Some(io::Error::other(e)),
        }
    }
}

/// A running stderr capture with its private cancellation token.
pub struct StderrCapture {
    cancel: CancellationToken,
    task: AbortOnDropHandle<Vec<u8>>,
    _guard: DropGuard,
}

impl StderrCapture {
    #[must_use]
    pub fn spawn(pipe: PipeReader) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(capture_stderr(pipe, cancel.clone()));
        Self {
            _guard: cancel.clone().drop_guard(),
            cancel,
            task: AbortOnDropHandle::new(task),
        }
    }

    /// Wait up to `grace` for the full capture, then cancel it and take
    /// whatever was read so far.
    pub async fn collect(self, grace: Duration) -> Vec<u8> {
        let mut task = self.task;
        let joined = match tokio::time::timeout(grace, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                tracing::debug!("Stderr still open after exit, cancelling capture");
                self.cancel.cancel();
                task.await
            }
        };

        joined.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Stderr capture task failed");
            Vec::new()
        })
    }

    /// Stop capturing and discard the output.
    pub async fn discard(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}
