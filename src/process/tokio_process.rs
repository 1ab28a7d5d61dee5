//! `ProcessHandle` backed by `tokio::process`.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};

use super::{PipeReader, PipeWriter, ProcessHandle, ProcessLauncher, ProcessSpec, SpawnError};

/// Launches real OS processes.
///
/// On Unix each child becomes the leader of its own process group so the
/// whole tree can be killed at once.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioLauncher;

impl ProcessLauncher for TokioLauncher {
    fn start(&self, spec: &ProcessSpec) -> Result<Box<dyn ProcessHandle>, SpawnError> {
        let mut cmd = Command::new(spec.executable());
        cmd.args(spec.get_args())
            .stdout(Stdio::piped())
            .stdin(if spec.redirects_stdin() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stderr(if spec.captures_stderr() {
                Stdio::piped()
            } else {
                Stdio::inherit()
            })
            .kill_on_drop(true);

        if let Some(dir) = spec.get_working_dir() {
            cmd.current_dir(dir);
        }

        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd
            .spawn()
            .map_err(|e| SpawnError::from_io(e, &spec.executable().to_string_lossy()))?;

        Ok(Box::new(TokioProcess::new(child)))
    }
}

/// A running `tokio::process::Child`.
#[derive(Debug)]
pub struct TokioProcess {
    child: Child,
    pid: Option<u32>,
    status: Option<ExitStatus>,
}

impl TokioProcess {
    #[must_use]
    pub fn new(child: Child) -> Self {
        let pid = child.id();
        Self {
            child,
            pid,
            status: None,
        }
    }

    /// Kill the child and everything left in its process group.
    ///
    /// A leader that already exited is not signalled again; only the rest of
    /// its group is.
    #[cfg(unix)]
    fn kill_tree(&mut self, leader_exited: bool) -> io::Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.pid else {
            return self.kill_leader(leader_exited);
        };
        let pgid = i32::try_from(pid).map_err(io::Error::other)?;

        match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
            Ok(()) => {
                tracing::debug!(pid, "Sent SIGKILL to process group");
                Ok(())
            }
            Err(Errno::ESRCH) if leader_exited => {
                tracing::debug!(pid, "Process group already gone");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(pid, error = %e, "Failed to kill process group, killing process only");
                self.kill_leader(leader_exited)
            }
        }
    }

    #[cfg(windows)]
    fn kill_tree(&mut self, leader_exited: bool) -> io::Result<()> {
        // Descendants of an exited leader cannot be found by its pid.
        let Some(pid) = self.pid.filter(|_| !leader_exited) else {
            return self.kill_leader(leader_exited);
        };

        let status = std::process::Command::new("taskkill")
            .args(["/pid", &pid.to_string(), "/f", "/t"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(s) if s.success() => Ok(()),
            _ => self.kill_leader(leader_exited),
        }
    }

    #[cfg(not(any(unix, windows)))]
    fn kill_tree(&mut self, leader_exited: bool) -> io::Result<()> {
        self.kill_leader(leader_exited)
    }

    fn kill_leader(&mut self, leader_exited: bool) -> io::Result<()> {
        if leader_exited {
            return Ok(());
        }
        self.child.start_kill()
    }
}

/// Exit code of a finished process.
///
/// Unix children terminated by a signal report `128 + signal`, the
/// convention shells use.
#[must_use]
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    -1
}

#[async_trait]
impl ProcessHandle for TokioProcess {
    fn id(&self) -> Option<u32> {
        self.pid
    }

    fn take_stdout(&mut self) -> Option<PipeReader> {
        self.child
            .stdout
            .take()
            .map(|pipe| Box::new(pipe) as PipeReader)
    }

    fn take_stdin(&mut self) -> Option<PipeWriter> {
        self.child
            .stdin
            .take()
            .map(|pipe| Box::new(pipe) as PipeWriter)
    }

    fn take_stderr(&mut self) -> Option<PipeReader> {
        self.child
            .stderr
            .take()
            .map(|pipe| Box::new(pipe) as PipeReader)
    }

    async fn wait_for_exit(&mut self, timeout: Duration) -> io::Result<bool> {
        if self.status.is_some() {
            return Ok(true);
        }

        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                self.status = Some(status);
                Ok(true)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(false),
        }
    }

    fn has_exited(&mut self) -> io::Result<bool> {
        if self.status.is_some() {
            return Ok(true);
        }

        let status = self.child.try_wait()?;
        self.status = status;
        Ok(status.is_some())
    }

    async fn kill(&mut self, include_descendants: bool) -> io::Result<()> {
        let exited = self.has_exited()?;

        // The group can outlive its leader, so it is signalled even after exit.
        if include_descendants {
            self.kill_tree(exited)?;
        } else if !exited {
            self.child.start_kill()?;
        }

        if exited {
            return Ok(());
        }

        let status = self.child.wait().await?;
        tracing::debug!(pid = ?self.pid, status = %status, "Process killed");
        self.status = Some(status);
        Ok(())
    }

    fn exit_code(&self) -> Option<i32> {
        self.status.map(exit_code_of)
    }

    fn dispose(self: Box<Self>) {
        tracing::debug!(pid = ?self.pid, exited = self.status.is_some(), "Disposing process handle");
    }
}
