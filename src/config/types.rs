//! Configuration types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default time to wait for a process to exit after its stdout is drained.
pub const DEFAULT_EXIT_GRACE_MS: u64 = 1000;

/// Default delay between spawning a process and touching its pipes.
pub const DEFAULT_STARTUP_DELAY_MS: u64 = 0;

/// Exit code reported when a console process is interrupted with Ctrl+C
/// (`STATUS_CONTROL_C_EXIT`).
#[cfg(windows)]
pub const DEFAULT_INTERRUPT_EXIT_CODE: i32 = -1_073_741_510;

/// Exit code reported when a process dies from `SIGINT` (128 + 2).
#[cfg(not(windows))]
pub const DEFAULT_INTERRUPT_EXIT_CODE: i32 = 130;

/// Configuration for a process runner. Fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Overall time limit in seconds. `None` means no timeout.
    pub timeout_secs: Option<u64>,
    /// Time to wait for the process to exit once its stdout is fully read.
    /// Also bounds the wait for captured stderr and the stdin relay.
    pub exit_grace_ms: u64,
    /// Delay after spawning before any pipe is used.
    pub startup_delay_ms: u64,
    /// Capture stderr for error messages. When off, stderr is inherited
    /// and shown live, and failures carry no message.
    pub capture_stderr: bool,
    /// Exit code that means the process was interrupted rather than failed.
    pub interrupt_exit_code: Option<i32>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            exit_grace_ms: DEFAULT_EXIT_GRACE_MS,
            startup_delay_ms: DEFAULT_STARTUP_DELAY_MS,
            capture_stderr: true,
            interrupt_exit_code: Some(DEFAULT_INTERRUPT_EXIT_CODE),
        }
    }
}

impl RunnerConfig {
    /// Set the overall timeout in seconds.
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Remove the overall timeout.
    #[must_use]
    pub fn without_timeout(mut self) -> Self {
        self.timeout_secs = None;
        self
    }

    #[must_use]
    pub fn with_exit_grace_ms(mut self, ms: u64) -> Self {
        self.exit_grace_ms = ms;
        self
    }

    #[must_use]
    pub fn with_startup_delay_ms(mut self, ms: u64) -> Self {
        self.startup_delay_ms = ms;
        self
    }

    #[must_use]
    pub fn with_capture_stderr(mut self, capture: bool) -> Self {
        self.capture_stderr = capture;
        self
    }

    #[must_use]
    pub fn with_interrupt_exit_code(mut self, code: Option<i32>) -> Self {
        self.interrupt_exit_code = code;
        self
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    #[must_use]
    pub fn exit_grace(&self) -> Duration {
        Duration::from_millis(self.exit_grace_ms)
    }

    #[must_use]
    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }
}
