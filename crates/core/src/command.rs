//! Local or remote command execution.
//!
//! Every external process the pipeline touches (registry queries, `sqlcmd`,
//! file staging) goes through [`CommandRunner`], so the same logic runs on
//! this machine or on a database host reached over a remote shell.

use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::error::ExecutionError;

/// Remote shell used when no other is configured.
pub const DEFAULT_REMOTE_SHELL: &str = "ssh";

/// File copy program used to move files to and from a remote host.
pub const DEFAULT_REMOTE_COPY: &str = "scp";

/// Runs an argument vector and returns its trimmed standard output.
pub trait CommandRunner {
    /// Execute `argv` (program first) and return stdout with surrounding
    /// whitespace trimmed. A non-zero exit is an [`ExecutionError`].
    fn execute(&self, argv: &[String]) -> Result<String, ExecutionError>;

    /// Copy `local` from this machine to `host_path` on the host commands
    /// run on.
    fn upload(&self, local: &Path, host_path: &str) -> Result<(), ExecutionError>;

    /// Copy `host_path` on the host commands run on to `local` on this
    /// machine.
    fn download(&self, host_path: &str, local: &Path) -> Result<(), ExecutionError>;
}

/// [`CommandRunner`] backed by `std::process`, optionally tunnelling every
/// command through a remote shell.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    remote_host: Option<String>,
    remote_shell: String,
    remote_copy: String,
}

impl ProcessRunner {
    /// Runner for commands on this machine.
    pub fn local() -> Self {
        Self {
            remote_host: None,
            remote_shell: DEFAULT_REMOTE_SHELL.to_string(),
            remote_copy: DEFAULT_REMOTE_COPY.to_string(),
        }
    }

    /// Runner that executes commands on `host` via `ssh`.
    pub fn remote(host: impl Into<String>) -> Self {
        Self {
            remote_host: Some(host.into()),
            ..Self::local()
        }
    }

    /// Local when `host` is `None`, remote otherwise.
    pub fn for_host(host: Option<&str>) -> Self {
        match host {
            Some(host) => Self::remote(host),
            None => Self::local(),
        }
    }

    pub fn with_remote_shell(mut self, shell: impl Into<String>) -> Self {
        self.remote_shell = shell.into();
        self
    }

    pub fn with_remote_copy(mut self, program: impl Into<String>) -> Self {
        self.remote_copy = program.into();
        self
    }

    pub fn remote_host(&self) -> Option<&str> {
        self.remote_host.as_deref()
    }

    /// The argument vector actually handed to the OS.
    ///
    /// Locally this is `argv` unchanged. Remotely it is
    /// `[remote_shell, host, ..argv]`, with whitespace-bearing arguments
    /// wrapped in double quotes so the remote shell re-tokenizes them as one
    /// word.
    pub fn dispatch_argv(&self, argv: &[String]) -> Vec<String> {
        match &self.remote_host {
            None => argv.to_vec(),
            Some(host) => {
                let mut dispatched = Vec::with_capacity(argv.len() + 2);
                dispatched.push(self.remote_shell.clone());
                dispatched.push(host.clone());
                dispatched.extend(argv.iter().map(|word| quote_for_remote(word)));
                dispatched
            }
        }
    }

    /// Copy command sending `local` to `host_path`; `None` when commands
    /// run on this machine.
    pub fn upload_argv(&self, local: &Path, host_path: &str) -> Option<Vec<String>> {
        let host = self.remote_host.as_deref()?;
        Some(vec![
            self.remote_copy.clone(),
            local.display().to_string(),
            format!("{host}:{}", quote_for_remote(host_path)),
        ])
    }

    /// Copy command fetching `host_path` into `local`; `None` when commands
    /// run on this machine.
    pub fn download_argv(&self, host_path: &str, local: &Path) -> Option<Vec<String>> {
        let host = self.remote_host.as_deref()?;
        Some(vec![
            self.remote_copy.clone(),
            format!("{host}:{}", quote_for_remote(host_path)),
            local.display().to_string(),
        ])
    }

    /// Run `argv` as given on this machine.
    fn spawn(&self, argv: &[String]) -> Result<String, ExecutionError> {
        let Some((program, args)) = argv.split_first() else {
            return Err(ExecutionError::Failed {
                argv: Vec::new(),
                exit_code: None,
                stdout: String::new(),
                stderr: "empty command".to_string(),
            });
        };

        debug!(argv = ?argv, remote = self.remote_host.is_some(), "Executing command");

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| ExecutionError::Spawn {
                program: program.clone(),
                argv: argv.to_vec(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();

        if !output.status.success() {
            return Err(ExecutionError::Failed {
                argv: argv.to_vec(),
                exit_code: output.status.code(),
                stdout,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(stdout)
    }
}

impl CommandRunner for ProcessRunner {
    fn execute(&self, argv: &[String]) -> Result<String, ExecutionError> {
        self.spawn(&self.dispatch_argv(argv))
    }

    fn upload(&self, local: &Path, host_path: &str) -> Result<(), ExecutionError> {
        match self.upload_argv(local, host_path) {
            Some(argv) => self.spawn(&argv).map(drop),
            None => copy_file(local, Path::new(host_path)),
        }
    }

    fn download(&self, host_path: &str, local: &Path) -> Result<(), ExecutionError> {
        match self.download_argv(host_path, local) {
            Some(argv) => self.spawn(&argv).map(drop),
            None => copy_file(Path::new(host_path), local),
        }
    }
}

fn copy_file(from: &Path, to: &Path) -> Result<(), ExecutionError> {
    debug!(from = %from.display(), to = %to.display(), "Copying file");
    std::fs::copy(from, to)
        .map(drop)
        .map_err(|source| ExecutionError::Transfer {
            from: from.display().to_string(),
            to: to.display().to_string(),
            source,
        })
}

fn quote_for_remote(word: &str) -> String {
    if word.chars().any(char::is_whitespace) {
        format!("\"{word}\"")
    } else {
        word.to_string()
    }
}

/// Build an owned argv from string slices.
pub fn argv<I, S>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    parts.into_iter().map(Into::into).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
