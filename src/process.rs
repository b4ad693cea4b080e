//! Centralized command execution with consistent error handling.
//!
//! Every interaction with the host (lsblk, fdisk, mkfs, mount, the boot-menu
//! installer) is described by a [`Cmd`] and executed through a
//! [`CommandRunner`]. The runner returns a structured [`CommandResult`];
//! [`Cmd::run`] turns a non-zero exit into
//! [`ProvisionError::ExternalCommandFailed`] carrying the command line and
//! its diagnostic output.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{ProvisionError, Result};

/// Result of a command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Exit code, or -1 if terminated by signal.
    pub code: i32,
    /// Captured stdout as a string.
    pub stdout: String,
    /// Captured stderr as a string.
    pub stderr: String,
}

impl CommandResult {
    /// A successful result with the given stdout.
    pub fn success_with(stdout: impl Into<String>) -> Self {
        Self {
            code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed result with the given exit code and stderr.
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Returns true if the command exited successfully.
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Get stdout, trimmed of whitespace.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    /// Get stderr, trimmed of whitespace.
    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }

    /// Best diagnostic output: stderr if present, stdout otherwise.
    fn diagnostic(&self) -> &str {
        let stderr = self.stderr_trimmed();
        if stderr.is_empty() {
            self.stdout_trimmed()
        } else {
            stderr
        }
    }
}

/// Executes commands. Implemented by [`SystemRunner`] for real processes and
/// by fakes in tests.
pub trait CommandRunner {
    /// Execute the command and capture its output.
    ///
    /// Returns `Err` only when the process could not be started; a non-zero
    /// exit is reported through [`CommandResult::code`].
    fn execute(&self, cmd: &Cmd) -> Result<CommandResult>;
}

/// Builder for configuring command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    stdin: Option<String>,
    /// If true, don't fail on non-zero exit.
    allow_fail: bool,
}

impl Cmd {
    /// Create a new command builder.
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            current_dir: None,
            stdin: None,
            allow_fail: false,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_string());
        }
        self
    }

    /// Add a path as an argument.
    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Set the working directory.
    pub fn dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    /// Feed the given text to the command's stdin.
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Allow non-zero exit codes without failing.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    pub fn stdin_data(&self) -> Option<&str> {
        self.stdin.as_deref()
    }

    /// The command line as it would be typed in a shell.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }

    /// Run the command through `runner`, failing on non-zero exit unless
    /// [`Cmd::allow_fail`] was set.
    pub fn run(self, runner: &dyn CommandRunner) -> Result<CommandResult> {
        let result = runner.execute(&self)?;

        if !self.allow_fail && !result.success() {
            return Err(ProvisionError::ExternalCommandFailed {
                command: self.display(),
                code: result.code,
                output: result.diagnostic().to_string(),
            });
        }

        Ok(result)
    }
}

/// Runs commands as real host processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn execute(&self, cmd: &Cmd) -> Result<CommandResult> {
        log::debug!("$ {}", cmd.display());

        let mut command = Command::new(&cmd.program);
        command.args(&cmd.args);
        if let Some(ref dir) = cmd.current_dir {
            command.current_dir(dir);
        }
        command.stdout(Stdio::piped()).stderr(Stdio::piped());
        command.stdin(if cmd.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let spawn_failed = |e: std::io::Error| ProvisionError::ExternalCommandFailed {
            command: cmd.display(),
            code: -1,
            output: format!("Failed to execute '{}'. Is it installed? ({})", cmd.program, e),
        };

        let mut child = command.spawn().map_err(spawn_failed)?;

        if let Some(ref input) = cmd.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(input.as_bytes()).map_err(spawn_failed)?;
            }
        }

        let output = child.wait_with_output().map_err(spawn_failed)?;
        let result = CommandResult {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.success() {
            log::debug!("  exit code {}: {}", result.code, result.stderr_trimmed());
        }
        Ok(result)
    }
}

/// Check if a program exists in PATH.
///
/// Returns the full path if found, None otherwise.
pub fn which(program: &str) -> Option<PathBuf> {
    which::which(program).ok()
}

/// Check if a program exists in PATH (bool version).
pub fn exists(program: &str) -> bool {
    which(program).is_some()
}

// =============================================================================
// Tests
// =============================================================================
