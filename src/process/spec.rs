//! Process specification builder.
//!
//! A `ProcessSpec` describes what to launch and which standard streams
//! are redirected to the parent. Stdout is always piped.

use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// Builder for configuring a process launch.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    executable: PathBuf,
    args: Vec<OsString>,
    working_dir: Option<PathBuf>,
    redirect_stdin: bool,
    capture_stderr: bool,
}

impl ProcessSpec {
    /// Create a new spec for the given executable.
    ///
    /// Stdin is not redirected and stderr is captured by default.
    #[must_use]
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            working_dir: None,
            redirect_stdin: false,
            capture_stderr: true,
        }
    }

    /// Standard settings: stdout piped, stderr piped unless it should be
    /// shown live to the user instead.
    #[must_use]
    pub fn standard<I, S>(executable: impl Into<PathBuf>, args: I, show_stderr: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Self::new(executable).args(args).capture_stderr(!show_stderr)
    }

    /// Append a single argument.
    #[must_use]
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Set the working directory for the process.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Pipe the parent's input into the process's stdin.
    #[must_use]
    pub fn redirect_stdin(mut self, redirect: bool) -> Self {
        self.redirect_stdin = redirect;
        self
    }

    /// Capture stderr for error messages instead of inheriting it.
    #[must_use]
    pub fn capture_stderr(mut self, capture: bool) -> Self {
        self.capture_stderr = capture;
        self
    }

    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    #[must_use]
    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    #[must_use]
    pub fn get_working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    #[must_use]
    pub fn redirects_stdin(&self) -> bool {
        self.redirect_stdin
    }

    #[must_use]
    pub fn captures_stderr(&self) -> bool {
        self.capture_stderr
    }

    /// Render the command line for logs, shell-escaped.
    #[must_use]
    pub fn display_command(&self) -> String {
        std::iter::once(self.executable.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(|part| shell_escape::escape(Cow::Owned(part.to_string_lossy().into_owned())))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
