//! Blocking adapter for consumers on plain threads.

use std::io::{self, Read, Seek, SeekFrom};

use tokio_util::io::SyncIoBridge;

use super::ProcessOutput;

/// `std::io::Read` over a [`ProcessOutput`].
///
/// Every call blocks the current thread on the runtime, so it must not be
/// used from inside an async task.
pub struct BlockingOutput {
    bridge: SyncIoBridge<ProcessOutput>,
    runtime: tokio::runtime::Handle,
}

impl BlockingOutput {
    pub(crate) fn new(output: ProcessOutput, runtime: tokio::runtime::Handle) -> Self {
        Self {
            bridge: SyncIoBridge::new_with_handle(output, runtime.clone()),
            runtime,
        }
    }

    /// Close the stream, blocking until the process is torn down.
    pub fn close(self) {
        let output = self.bridge.into_inner();
        self.runtime.block_on(output.close());
    }
}

impl Read for BlockingOutput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.bridge.read(buf)
    }
}

/// Always fails: process pipes cannot seek.
impl Seek for BlockingOutput {
    fn seek(&mut self, position: SeekFrom) -> io::Result<u64> {
        self.bridge.seek(position)
    }
}
