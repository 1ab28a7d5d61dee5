//! Scripted in-memory process for deterministic runner tests.

use std::io::{self, Cursor};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::DuplexStream;

use proc_relay::process::{
    PipeReader, PipeWriter, ProcessHandle, ProcessLauncher, ProcessSpec, SpawnError,
};

/// Exit code reported by a scripted process after it is killed.
pub const KILLED_EXIT_CODE: i32 = 137;

#[derive(Debug, Default)]
pub struct Counters {
    pub kills: AtomicUsize,
    pub disposals: AtomicUsize,
}

impl Counters {
    pub fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    pub fn disposals(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }
}

/// A fake process. It either has already exited with `exit_code`, or it
/// hangs until killed. Killing it closes any stdout writer it holds.
pub struct ScriptedProcess {
    stdout: Option<PipeReader>,
    stderr: Option<PipeReader>,
    stdin: Option<PipeWriter>,
    stdout_writer: Option<DuplexStream>,
    exit_code: i32,
    hangs: bool,
    killed: bool,
    counters: Arc<Counters>,
}

impl ScriptedProcess {
    /// A process that printed `stdout` and exited with `exit_code`.
    pub fn exited(stdout: &[u8], exit_code: i32) -> Self {
        Self {
            stdout: Some(Box::new(Cursor::new(stdout.to_vec()))),
            stderr: None,
            stdin: None,
            stdout_writer: None,
            exit_code,
            hangs: false,
            killed: false,
            counters: Arc::new(Counters::default()),
        }
    }

    /// A process that never exits and keeps stdout open until killed.
    pub fn hanging() -> Self {
        let (writer, reader) = tokio::io::duplex(1024);
        Self {
            stdout: Some(Box::new(reader)),
            stdout_writer: Some(writer),
            hangs: true,
            ..Self::exited(b"", 0)
        }
    }

    /// A process that closed stdout but never exits on its own.
    pub fn stuck_after_output(stdout: &[u8]) -> Self {
        Self {
            hangs: true,
            ..Self::exited(stdout, 0)
        }
    }

    pub fn with_stderr(mut self, stderr: &[u8]) -> Self {
        self.stderr = Some(Box::new(Cursor::new(stderr.to_vec())));
        self
    }

    pub fn with_stdout(mut self, stdout: PipeReader) -> Self {
        self.stdout = Some(stdout);
        self
    }

    pub fn with_stdin(mut self, stdin: PipeWriter) -> Self {
        self.stdin = Some(stdin);
        self
    }

    pub fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }

    fn running(&self) -> bool {
        self.hangs && !self.killed
    }
}

#[async_trait]
impl ProcessHandle for ScriptedProcess {
    fn id(&self) -> Option<u32> {
        Some(4242)
    }

    fn take_stdout(&mut self) -> Option<PipeReader> {
        self.stdout.take()
    }

    fn take_stdin(&mut self) -> Option<PipeWriter> {
        self.stdin.take()
    }

    fn take_stderr(&mut self) -> Option<PipeReader> {
        self.stderr.take()
    }

    async fn wait_for_exit(&mut self, timeout: Duration) -> io::Result<bool> {
        if self.running() {
            tokio::time::sleep(timeout).await;
            return Ok(false);
        }
        Ok(true)
    }

    fn has_exited(&mut self) -> io::Result<bool> {
        Ok(!self.running())
    }

    async fn kill(&mut self, _include_descendants: bool) -> io::Result<()> {
        self.counters.kills.fetch_add(1, Ordering::SeqCst);
        if self.running() {
            self.killed = true;
            self.stdout_writer = None;
        }
        Ok(())
    }

    fn exit_code(&self) -> Option<i32> {
        if self.killed {
            Some(KILLED_EXIT_CODE)
        } else if self.hangs {
            None
        } else {
            Some(self.exit_code)
        }
    }

    fn dispose(self: Box<Self>) {
        self.counters.disposals.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hands out a single scripted process.
pub struct ScriptedLauncher {
    process: Mutex<Option<ScriptedProcess>>,
    specs: Mutex<Vec<ProcessSpec>>,
}

impl ScriptedLauncher {
    pub fn new(process: ScriptedProcess) -> Arc<Self> {
        Arc::new(Self {
            process: Mutex::new(Some(process)),
            specs: Mutex::new(Vec::new()),
        })
    }

    pub fn last_spec(&self) -> Option<ProcessSpec> {
        self.specs.lock().unwrap().last().cloned()
    }
}

impl ProcessLauncher for ScriptedLauncher {
    fn start(&self, spec: &ProcessSpec) -> Result<Box<dyn ProcessHandle>, SpawnError> {
        self.specs.lock().unwrap().push(spec.clone());
        match self.process.lock().unwrap().take() {
            Some(process) => Ok(Box::new(process)),
            None => Err(SpawnError::Io(io::Error::other("scripted process already used"))),
        }
    }
}

/// Wait until `check` holds, failing the test after a few seconds.
pub async fn eventually(check: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
