//! Process handle and launcher abstractions.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use super::{ProcessSpec, SpawnError};

/// Readable end of a child pipe.
pub type PipeReader = Box<dyn AsyncRead + Send + Unpin>;

/// Writable end of a child pipe.
pub type PipeWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A started process.
///
/// Pipes are taken out of the handle once; the handle itself is owned by
/// a single task that waits, kills and finally disposes of it.
#[async_trait]
pub trait ProcessHandle: Send {
    /// OS process id, if known.
    fn id(&self) -> Option<u32>;

    /// Take the stdout pipe. Subsequent calls return `None`.
    fn take_stdout(&mut self) -> Option<PipeReader>;

    /// Take the stdin pipe, if it was redirected.
    fn take_stdin(&mut self) -> Option<PipeWriter>;

    /// Take the stderr pipe, if it was redirected.
    fn take_stderr(&mut self) -> Option<PipeReader>;

    /// Wait up to `timeout` for the process to exit.
    ///
    /// Returns `true` if it exited within the timeout.
    async fn wait_for_exit(&mut self, timeout: Duration) -> io::Result<bool>;

    /// Check whether the process has exited without blocking.
    fn has_exited(&mut self) -> io::Result<bool>;

    /// Forcefully kill the process, optionally with all its descendants,
    /// and wait for it to be reaped.
    async fn kill(&mut self, include_descendants: bool) -> io::Result<()>;

    /// Exit code, once the process has exited.
    fn exit_code(&self) -> Option<i32>;

    /// Release the handle.
    fn dispose(self: Box<Self>);
}

/// Starts processes from a `ProcessSpec`.
pub trait ProcessLauncher: Send + Sync {
    /// Start the process described by `spec`.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError` if the process cannot be started.
    fn start(&self, spec: &ProcessSpec) -> Result<Box<dyn ProcessHandle>, SpawnError>;
}
