//! Boundary to the denormalisation transform.
//!
//! The merge algorithm itself lives outside this crate. The orchestrator
//! builds a [`TransformRequest`] and hands it to a [`Transformer`];
//! [`ProgramTransformer`] runs an external program and pipes the request to
//! its stdin as JSON.

use std::fmt;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::{Serialize, Serializer};
use tracing::{debug, info};

use crate::config::{Credentials, ResolvedTarget};
use crate::error::TransformError;
use crate::policy::MergePolicy;

/// Transform program used when none is configured.
pub const DEFAULT_TRANSFORM_PROGRAM: &str = "nvivo-denormalise";

// ---------------------------------------------------------------------------
// Locators
// ---------------------------------------------------------------------------

/// Where the normalized snapshot is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocator {
    pub path: PathBuf,
}

impl SourceLocator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn url(&self) -> String {
        format!("sqlite:///{}", self.path.display())
    }
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

impl Serialize for SourceLocator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.url())
    }
}

/// Connection to the working database. `Display` masks the password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseLocator {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub credentials: Credentials,
}

impl DatabaseLocator {
    pub fn new(target: &ResolvedTarget, database: &str, credentials: &Credentials) -> Self {
        Self {
            host: target.client_host().to_string(),
            port: target.port,
            database: database.to_string(),
            credentials: credentials.clone(),
        }
    }

    pub fn url(&self) -> String {
        self.render(&self.credentials.password)
    }

    fn render(&self, password: &str) -> String {
        format!(
            "mssql+pymssql://{}:{}@{}:{}/{}",
            self.credentials.user, password, self.host, self.port, self.database
        )
    }
}

impl fmt::Display for DatabaseLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render("***"))
    }
}

impl Serialize for DatabaseLocator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.url())
    }
}

// ---------------------------------------------------------------------------
// Request / Transformer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct TransformRequest {
    pub input: SourceLocator,
    pub output: DatabaseLocator,
    pub policy: MergePolicy,
}

pub trait Transformer {
    /// Merge the request's input into its output database.
    fn transform(&self, request: &TransformRequest) -> Result<(), TransformError>;
}

/// Runs an external transform program with the request on stdin.
#[derive(Debug, Clone)]
pub struct ProgramTransformer {
    program: PathBuf,
    args: Vec<String>,
}

impl ProgramTransformer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Extra leading arguments, e.g. the script for an interpreter.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Default for ProgramTransformer {
    fn default() -> Self {
        Self::new(DEFAULT_TRANSFORM_PROGRAM)
    }
}

impl Transformer for ProgramTransformer {
    fn transform(&self, request: &TransformRequest) -> Result<(), TransformError> {
        let payload = serde_json::to_vec(request)?;
        let program = self.program.display().to_string();

        info!(program = %program, input = %request.input, output = %request.output, "Running transform");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| TransformError::Spawn {
                program: program.clone(),
                source,
            })?;

        if let Some(stdin) = child.stdin.take() {
            if let Err(source) = feed_stdin(stdin, &payload) {
                // Reap the child before reporting; the write error is the cause.
                let _ = child.kill();
                let _ = child.wait();
                return Err(TransformError::Spawn { program, source });
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|source| TransformError::Spawn { program, source })?;

        debug!(stdout = %String::from_utf8_lossy(&output.stdout).trim(), "Transform output");

        if !output.status.success() {
            return Err(TransformError::Failed {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

/// Write the request and close stdin. A program that exits without reading
/// its input closes the pipe early; its exit status decides the outcome.
fn feed_stdin(mut stdin: impl Write, payload: &[u8]) -> io::Result<()> {
    match stdin.write_all(payload) {
        Err(err) if err.kind() != ErrorKind::BrokenPipe => Err(err),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
