//! Run outcomes and exit-code classification.

use std::io;
use std::time::Duration;

use super::RunError;

/// How a run ended. Produced once by the finalizer.
#[derive(Debug)]
pub enum RunOutcome {
    /// Exit code zero.
    Success,
    /// External cancellation, early close, or an interrupt exit code.
    Cancelled,
    /// Killed after the overall timeout.
    TimedOut { timeout: Duration },
    /// Any other nonzero exit code.
    Failed {
        exit_code: i32,
        diagnostics: Option<String>,
        input_error: Option<io::Error>,
    },
}

impl RunOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Convert into the error the consumer sees.
    ///
    /// # Errors
    ///
    /// Returns the matching `RunError` for every outcome except `Success`.
    pub fn into_result(self) -> Result<(), RunError> {
        match self {
            Self::Success => Ok(()),
            Self::Cancelled => Err(RunError::Cancelled),
            Self::TimedOut { timeout } => Err(RunError::TimedOut { timeout }),
            Self::Failed {
                exit_code,
                diagnostics,
                input_error,
            } => Err(RunError::ExecutionFailed {
                exit_code,
                message: diagnostics,
                input_error,
            }),
        }
    }
}

/// Classification of a process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClass {
    Success,
    Interrupted,
    Failure(i32),
}

/// Classify `exit_code`, treating `interrupt_code` as an interruption.
#[must_use]
pub fn classify_exit_code(exit_code: i32, interrupt_code: Option<i32>) -> ExitClass {
    if exit_code == 0 {
        ExitClass::Success
    } else if interrupt_code == Some(exit_code) {
        ExitClass::Interrupted
    } else {
        ExitClass::Failure(exit_code)
    }
}
