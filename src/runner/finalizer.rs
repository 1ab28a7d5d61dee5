//! Exit finalizer.
//!
//! Owns the process handle for the whole run. It races stdout completion
//! against cancellation and the overall timeout, kills the process when
//! needed, classifies the exit code and disposes of the handle exactly once.

use std::io;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::process::ProcessHandle;

use super::relay::{StderrCapture, StdinRelay};
use super::{classify_exit_code, Completion, CompletionSignal, ExitClass, RunError, RunOutcome};

/// Finalizer progress, logged on each transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizerState {
    Starting,
    RacingCompletion,
    KillingOnCancel,
    KillingOnTimeout,
    DrainExit,
    ClassifyingExit,
    Disposed,
}

#[derive(Debug)]
struct StateTracker {
    state: FinalizerState,
}

impl StateTracker {
    fn new() -> Self {
        Self {
            state: FinalizerState::Starting,
        }
    }

    fn transition(&mut self, new_state: FinalizerState) {
        tracing::debug!(from = ?self.state, to = ?new_state, "State transition");
        self.state = new_state;
    }
}

/// What ended the completion race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Cancelled,
    Completed(Completion),
    TimedOut,
}

/// Timing used by the finalizer.
#[derive(Debug, Clone, Copy)]
pub struct FinalizerSettings {
    pub timeout: Option<Duration>,
    pub exit_grace: Duration,
    pub interrupt_exit_code: Option<i32>,
}

/// Background relays joined by the finalizer before it resolves.
#[derive(Default)]
pub struct Relays {
    pub stdin: Option<StdinRelay>,
    pub stderr: Option<StderrCapture>,
}

impl Relays {
    /// Stop both relays after the process is gone, dropping their results.
    async fn shut_down(&mut self, grace: Duration) {
        if let Some(capture) = self.stderr.take() {
            capture.discard().await;
        }
        if let Some(relay) = self.stdin.take() {
            if let Some(e) = relay.join(grace).await {
                tracing::debug!(error = %e, "Stdin relay ended with error after kill");
            }
        }
    }
}

/// The finalizer task for a single run.
pub struct Finalizer {
    pub handle: Box<dyn ProcessHandle>,
    pub completion: CompletionSignal,
    pub cancel: CancellationToken,
    pub relays: Relays,
    pub settings: FinalizerSettings,
}

impl Finalizer {
    /// Resolve the run and dispose of the process handle.
    ///
    /// # Errors
    ///
    /// Returns `RunError::Io` if waiting on the process fails.
    pub async fn run(self) -> Result<RunOutcome, RunError> {
        let Self {
            mut handle,
            completion,
            cancel,
            mut relays,
            settings,
        } = self;

        let span = tracing::debug_span!("finalizer", pid = ?handle.id());
        async move {
            let mut tracker = StateTracker::new();
            let resolved = resolve(
                handle.as_mut(),
                &completion,
                &cancel,
                &mut relays,
                settings,
                &mut tracker,
            )
            .await;

            // Covers every branch above, including errors.
            relays.shut_down(settings.exit_grace).await;
            handle.dispose();
            tracker.transition(FinalizerState::Disposed);

            match &resolved {
                Ok(outcome) => tracing::debug!(outcome = ?outcome, "Run resolved"),
                Err(e) => tracing::warn!(error = %e, "Run resolution failed"),
            }
            resolved
        }
        .instrument(span)
        .await
    }
}

async fn race(
    completion: &CompletionSignal,
    cancel: &CancellationToken,
    timeout: Option<Duration>,
) -> Trigger {
    let deadline = async {
        match timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        biased;

        () = cancel.cancelled() => Trigger::Cancelled,
        done = completion.wait() => Trigger::Completed(done),
        () = deadline => Trigger::TimedOut,
    }
}

async fn kill_tree(handle: &mut dyn ProcessHandle) {
    if let Err(e) = handle.kill(true).await {
        tracing::warn!(error = %e, "Failed to kill process");
    }
}

/// Only a failed run carries the stdin error; other outcomes just log it.
fn log_unused_input_error(input_error: Option<io::Error>) {
    if let Some(e) = input_error {
        tracing::debug!(error = %e, "Stdin relay failed without affecting the outcome");
    }
}

async fn resolve(
    handle: &mut dyn ProcessHandle,
    completion: &CompletionSignal,
    cancel: &CancellationToken,
    relays: &mut Relays,
    settings: FinalizerSettings,
    tracker: &mut StateTracker,
) -> Result<RunOutcome, RunError> {
    tracker.transition(FinalizerState::RacingCompletion);

    match race(completion, cancel, settings.timeout).await {
        Trigger::Cancelled => {
            tracker.transition(FinalizerState::KillingOnCancel);
            tracing::info!("Run cancelled, killing process");
            kill_tree(handle).await;
            return Ok(RunOutcome::Cancelled);
        }
        Trigger::Completed(Completion::Abandoned) => {
            tracker.transition(FinalizerState::KillingOnCancel);
            tracing::debug!("Output closed early, killing process");
            kill_tree(handle).await;
            return Ok(RunOutcome::Cancelled);
        }
        Trigger::TimedOut => {
            // Lucky: it finished before there was a chance to kill it.
            if handle.has_exited()? {
                tracing::debug!("Timeout elapsed but process already exited");
            } else {
                tracker.transition(FinalizerState::KillingOnTimeout);
                let timeout = settings.timeout.unwrap_or_default();
                tracing::warn!(timeout = ?timeout, "Process timed out, killing it");
                kill_tree(handle).await;
                return Ok(RunOutcome::TimedOut { timeout });
            }
        }
        Trigger::Completed(Completion::Drained) => {
            tracker.transition(FinalizerState::DrainExit);
            if !handle.wait_for_exit(settings.exit_grace).await? {
                tracing::warn!(
                    grace = ?settings.exit_grace,
                    "Process still running after stdout closed, killing it"
                );
                handle.kill(true).await?;
            }
        }
    }

    tracker.transition(FinalizerState::ClassifyingExit);
    let exit_code = handle
        .exit_code()
        .ok_or_else(|| io::Error::other("exit code not available after process exit"))?;
    tracing::debug!(exit_code, "Process exited");

    let input_error = match relays.stdin.take() {
        Some(relay) => relay.join(settings.exit_grace).await,
        None => None,
    };

    match classify_exit_code(exit_code, settings.interrupt_exit_code) {
        ExitClass::Success => {
            log_unused_input_error(input_error);
            Ok(RunOutcome::Success)
        }
        ExitClass::Interrupted => {
            tracing::info!(exit_code, "Process was interrupted");
            log_unused_input_error(input_error);
            Ok(RunOutcome::Cancelled)
        }
        ExitClass::Failure(exit_code) => {
            let diagnostics = match relays.stderr.take() {
                Some(capture) => {
                    let bytes = capture.collect(settings.exit_grace).await;
                    Some(String::from_utf8_lossy(&bytes).into_owned())
                }
                None => None,
            };
            Ok(RunOutcome::Failed {
                exit_code,
                diagnostics,
                input_error,
            })
        }
    }
}
