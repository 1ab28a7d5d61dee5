//! Output stream handed to the consumer.

use std::future::Future;
use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};
use tokio::task::{JoinError, JoinHandle};

use crate::process::PipeReader;

use super::{BlockingOutput, Completion, CompletionSignal, RunError, RunOutcome};

/// Join handle of the finalizer task.
pub type FinalizerHandle = JoinHandle<Result<RunOutcome, RunError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputState {
    Streaming,
    AwaitingOutcome,
    Ended,
}

/// Stdout of a running process, readable with `tokio::io::AsyncRead`.
///
/// The read that hits end of stream waits for the process to be resolved
/// and then either ends cleanly or fails with the run's error (see
/// [`RunError::from_io`]). Reading again after that fails with
/// [`RunError::ReadPastEnd`].
///
/// Process pipes cannot seek: the `AsyncSeek` impl always fails with
/// `io::ErrorKind::Unsupported` and leaves the stream untouched.
///
/// Dropping the stream before the end tells the run that the consumer gave
/// up; the process is killed in the background. Use [`ProcessOutput::close`]
/// to wait for that teardown.
pub struct ProcessOutput {
    stdout: PipeReader,
    completion: CompletionSignal,
    finalizer: Option<FinalizerHandle>,
    state: OutputState,
    pid: Option<u32>,
}

impl std::fmt::Debug for ProcessOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessOutput")
            .field("pid", &self.pid)
            .field("state", &self.state)
            .field("completion", &self.completion.get())
            .finish_non_exhaustive()
    }
}

fn flatten(joined: Result<Result<RunOutcome, RunError>, JoinError>) -> Result<(), RunError> {
    joined
        .map_err(|e| RunError::Io(e.into()))?
        .and_then(RunOutcome::into_result)
}

impl ProcessOutput {
    pub(crate) fn new(
        stdout: PipeReader,
        completion: CompletionSignal,
        finalizer: FinalizerHandle,
        pid: Option<u32>,
    ) -> Self {
        Self {
            stdout,
            completion,
            finalizer: Some(finalizer),
            state: OutputState::Streaming,
            pid,
        }
    }

    /// Process id of the child, if known.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the end of stdout has been reached.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.state != OutputState::Streaming
    }

    /// Close the stream and wait for the process to be torn down.
    ///
    /// If stdout was not read to the end, the run is abandoned and the
    /// process killed. The run's outcome is discarded: only reads report
    /// errors.
    pub async fn close(mut self) {
        if self.completion.set(Completion::Abandoned) {
            tracing::debug!(pid = ?self.pid, "Output closed before end of stream");
        }

        if let Some(finalizer) = self.finalizer.take() {
            match flatten(finalizer.await) {
                Ok(()) => {}
                // Cancellation on close is quiet.
                Err(RunError::Cancelled) => {}
                Err(e) => tracing::debug!(pid = ?self.pid, error = %e, "Discarding run error on close"),
            }
        }
        self.state = OutputState::Ended;
    }

    /// Adapt into a blocking `std::io::Read` driven by `runtime`.
    ///
    /// The returned reader must be used outside of async contexts.
    #[must_use]
    pub fn into_blocking(self, runtime: tokio::runtime::Handle) -> BlockingOutput {
        BlockingOutput::new(self, runtime)
    }

    fn poll_outcome(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), RunError>> {
        let Some(finalizer) = self.finalizer.as_mut() else {
            return Poll::Ready(Err(RunError::ReadPastEnd));
        };
        let joined = ready!(Pin::new(finalizer).poll(cx));
        self.finalizer = None;
        Poll::Ready(flatten(joined))
    }
}

impl AsyncRead for ProcessOutput {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        loop {
            match this.state {
                OutputState::Ended => return Poll::Ready(Err(RunError::ReadPastEnd.into())),
                OutputState::Streaming => {
                    if buf.remaining() == 0 {
                        return Poll::Ready(Ok(()));
                    }
                    let before = buf.filled().len();
                    ready!(Pin::new(&mut this.stdout).poll_read(cx, buf))?;
                    if buf.filled().len() > before {
                        return Poll::Ready(Ok(()));
                    }

                    this.state = OutputState::AwaitingOutcome;
                    if this.completion.set(Completion::Drained) {
                        tracing::debug!(pid = ?this.pid, "Stdout drained");
                    }
                }
                OutputState::AwaitingOutcome => {
                    let outcome = ready!(this.poll_outcome(cx));
                    this.state = OutputState::Ended;
                    return Poll::Ready(outcome.map_err(io::Error::from));
                }
            }
        }
    }
}

fn seek_unsupported() -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, "process output is not seekable")
}

impl AsyncSeek for ProcessOutput {
    fn start_seek(self: Pin<&mut Self>, _position: SeekFrom) -> io::Result<()> {
        Err(seek_unsupported())
    }

    fn poll_complete(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Poll::Ready(Err(seek_unsupported()))
    }
}

impl Drop for ProcessOutput {
    fn drop(&mut self) {
        if self.completion.set(Completion::Abandoned) {
            tracing::debug!(pid = ?self.pid, "Output dropped before end of stream");
        }
    }
}
