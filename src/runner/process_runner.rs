//! Process runner: starts a process and hands back its output stream.
//!
//! The runner starts the process, launches stderr capture, the stdin relay
//! and the exit finalizer as background tasks, and returns a
//! [`ProcessOutput`] right away. Errors from the run are reported by the
//! final read of that stream.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::config::RunnerConfig;
use crate::process::{PipeReader, ProcessHandle, ProcessLauncher, ProcessSpec, TokioLauncher};

use super::finalizer::{Finalizer, FinalizerSettings, Relays};
use super::relay::{StderrCapture, StdinRelay};
use super::{CompletionSignal, ProcessOutput, RunError};

/// Runs external processes and streams their stdout.
#[derive(Clone)]
pub struct ProcessRunner {
    config: RunnerConfig,
    launcher: Arc<dyn ProcessLauncher>,
}

impl std::fmt::Debug for ProcessRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessRunner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(RunnerConfig::default())
    }
}

impl ProcessRunner {
    /// Create a runner that launches real OS processes.
    #[must_use]
    pub fn new(config: RunnerConfig) -> Self {
        Self::with_launcher(config, Arc::new(TokioLauncher))
    }

    /// Create a runner with a custom launcher.
    #[must_use]
    pub fn with_launcher(config: RunnerConfig, launcher: Arc<dyn ProcessLauncher>) -> Self {
        Self { config, launcher }
    }

    #[must_use]
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run `executable` and return its stdout.
    ///
    /// # Errors
    ///
    /// Returns `RunError::Spawn` if the process cannot be started. Failures
    /// after start are reported by the final read of the returned stream.
    pub async fn run_and_read_output<I, S>(
        &self,
        executable: impl AsRef<Path>,
        args: I,
        cancel: CancellationToken,
    ) -> Result<ProcessOutput, RunError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let spec = self.spec_for(executable.as_ref(), args);
        self.start(spec, None, cancel).await
    }

    /// Run `executable` with `input` fed to its stdin and return its stdout.
    ///
    /// # Errors
    ///
    /// Returns `RunError::Spawn` if the process cannot be started.
    pub async fn run_and_read_output_with_input<I, S, R>(
        &self,
        executable: impl AsRef<Path>,
        args: I,
        input: R,
        cancel: CancellationToken,
    ) -> Result<ProcessOutput, RunError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
        R: AsyncRead + Send + Unpin + 'static,
    {
        let spec = self
            .spec_for(executable.as_ref(), args)
            .redirect_stdin(true);
        self.start(spec, Some(Box::new(input)), cancel).await
    }

    fn spec_for<I, S>(&self, executable: &Path, args: I) -> ProcessSpec
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        ProcessSpec::standard(executable, args, !self.config.capture_stderr)
    }

    /// Start the process described by `spec` and wire up its background
    /// tasks.
    ///
    /// # Errors
    ///
    /// Returns `RunError::Spawn` if the process cannot be started, or
    /// `RunError::MissingPipe` if a redirected pipe is not available.
    pub async fn start(
        &self,
        spec: ProcessSpec,
        input: Option<PipeReader>,
        cancel: CancellationToken,
    ) -> Result<ProcessOutput, RunError> {
        let mut handle = self.launcher.start(&spec)?;
        let pid = handle.id();
        tracing::info!(pid = ?pid, command = %spec.display_command(), "Started process");

        // Some processes do not have their pipes ready right after spawn.
        let delay = self.config.startup_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let Some(stdout) = handle.take_stdout() else {
            discard(handle).await;
            return Err(RunError::MissingPipe("stdout"));
        };

        let mut relays = Relays::default();

        if spec.captures_stderr() {
            match handle.take_stderr() {
                Some(pipe) => relays.stderr = Some(StderrCapture::spawn(pipe)),
                None => tracing::warn!(pid = ?pid, "Stderr capture requested but pipe missing"),
            }
        }

        if let Some(input) = input {
            let Some(stdin) = handle.take_stdin() else {
                discard(handle).await;
                return Err(RunError::MissingPipe("stdin"));
            };
            relays.stdin = Some(StdinRelay::spawn(input, stdin));
        }

        let completion = CompletionSignal::new();
        let finalizer = Finalizer {
            handle,
            completion: completion.clone(),
            cancel,
            relays,
            settings: FinalizerSettings {
                timeout: self.config.timeout(),
                exit_grace: self.config.exit_grace(),
                interrupt_exit_code: self.config.interrupt_exit_code,
            },
        };
        let finalizer = tokio::spawn(finalizer.run());

        Ok(ProcessOutput::new(stdout, completion, finalizer, pid))
    }
}

async fn discard(mut handle: Box<dyn ProcessHandle>) {
    if let Err(e) = handle.kill(true).await {
        tracing::warn!(error = %e, "Failed to kill process with missing pipe");
    }
    handle.dispose();
}
