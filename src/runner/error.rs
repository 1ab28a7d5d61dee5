//! Run error types.

use std::io;
use std::time::Duration;

use crate::process::SpawnError;

/// Terminal error of a process run.
///
/// Surfaces from the final read of a `ProcessOutput` as the inner error of
/// an `io::Error`; use [`RunError::from_io`] to get it back.
#[derive(thiserror::Error, Debug)]
pub enum RunError {
    /// Read attempted after the stream already ended.
    #[error("The stream has ended and all data has already been returned")]
    ReadPastEnd,
    /// The run was cancelled or the process was interrupted.
    #[error("Process has been cancelled")]
    Cancelled,
    /// The overall timeout elapsed and the process was killed.
    #[error("Process took longer than {timeout:?} and has been killed")]
    TimedOut { timeout: Duration },
    /// The process exited with a failing code.
    #[error("Process exited with code {exit_code}{}", detail(.message.as_deref()))]
    ExecutionFailed {
        exit_code: i32,
        /// Captured stderr, if stderr was captured.
        message: Option<String>,
        /// Failure while feeding stdin, if any.
        #[source]
        input_error: Option<io::Error>,
    },
    /// A pipe that should have been redirected was missing.
    #[error("Process {0} pipe not available")]
    MissingPipe(&'static str),
    /// The process could not be started.
    #[error("Failed to start process: {0}")]
    Spawn(#[from] SpawnError),
    /// I/O error while supervising the process.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

fn detail(message: Option<&str>) -> String {
    match message.map(str::trim_end) {
        Some(text) if !text.is_empty() => format!(": {text}"),
        _ => String::new(),
    }
}

impl RunError {
    /// Recover a `RunError` carried inside an `io::Error`.
    #[must_use]
    pub fn from_io(err: &io::Error) -> Option<&RunError> {
        err.get_ref()
            .and_then(|inner| inner.downcast_ref::<RunError>())
    }

    /// Exit code of the failed process, if the run failed on one.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::ExecutionFailed { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }

    /// Captured diagnostic text of a failed process.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::ExecutionFailed { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    fn io_kind(&self) -> io::ErrorKind {
        match self {
            Self::TimedOut { .. } => io::ErrorKind::TimedOut,
            Self::MissingPipe(_) => io::ErrorKind::BrokenPipe,
            Self::Io(e) if e.kind() != io::ErrorKind::Interrupted => e.kind(),
            // Never `Interrupted`: std readers retry on it and would hit ReadPastEnd.
            _ => io::ErrorKind::Other,
        }
    }
}

impl From<RunError> for io::Error {
    fn from(err: RunError) -> Self {
        io::Error::new(err.io_kind(), err)
    }
}
