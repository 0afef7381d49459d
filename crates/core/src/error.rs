//! Error taxonomy for the denormalisation pipeline.
//!
//! Each stage owns a narrow error type; [`DenormaliseError`] unifies them so
//! stage helpers can use `?`, and [`RunFailure`] is what the orchestrator
//! hands back to its caller.

use std::fmt;
use std::path::PathBuf;

/// Invalid or missing configuration. Always raised before any working
/// database exists.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown entity category: '{0}'")]
    UnknownCategory(String),

    #[error("Unknown action: '{0}'. Must be one of: skip, merge, overwrite, replace")]
    UnknownAction(String),

    #[error("Invalid action '{action}' for {category}. Must be one of: {allowed}")]
    DisallowedAction {
        category: &'static str,
        action: &'static str,
        allowed: String,
    },

    #[error("Invalid product version: '{0}'. Must be one of: 10, 11")]
    UnknownProductVersion(String),

    #[error("No database server on this machine, so a remote host must be specified")]
    HostRequired,

    #[error("Template file not found: {}", .0.display())]
    MissingTemplate(PathBuf),
}

/// A local or remote command failed to run or exited non-zero.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("failed to spawn `{program}` for {argv:?}: {source}")]
    Spawn {
        program: String,
        argv: Vec<String>,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to copy {from} to {to}: {source}")]
    Transfer {
        from: String,
        to: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command {argv:?} failed (exit code {exit_code:?}): {stderr}")]
    Failed {
        argv: Vec<String>,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },
}

/// Instance or port lookup failed.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("No suitable SQL server instance found (wanted version {expected})")]
    NoSuitableInstance { expected: &'static str },

    #[error("Could not read TCP port for instance '{instance}' from: {output:?}")]
    MalformedPortQuery { instance: String, output: String },

    #[error("registry query failed: {0}")]
    Query(#[from] ExecutionError),
}

#[derive(Debug, thiserror::Error)]
pub enum AttachError {
    #[error("a database named '{0}' already exists on the server")]
    NameCollision(String),

    #[error("failed to attach template as '{name}': {source}")]
    Failed {
        name: String,
        #[source]
        source: ExecutionError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("cannot save '{name}' while it is {state}")]
    InvalidState { name: String, state: &'static str },

    #[error("failed to save '{name}' to {}: {source}", .output.display())]
    Failed {
        name: String,
        output: PathBuf,
        #[source]
        source: ExecutionError,
    },
}

#[derive(Debug, thiserror::Error)]
#[error("failed to drop working database '{name}': {source}")]
pub struct DropError {
    pub name: String,
    #[source]
    pub source: ExecutionError,
}

/// Opaque failure reported by the transform collaborator.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("failed to encode transform request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to spawn transform program `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("transform failed (exit code {exit_code:?}): {stderr}")]
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum DenormaliseError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Attach(#[from] AttachError),

    #[error(transparent)]
    Save(#[from] SaveError),

    #[error(transparent)]
    Drop(#[from] DropError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error("failed to write comments log {}: {source}", .path.display())]
    Sidecar {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The outcome of a failed run: the first error raised, plus any teardown
/// failure that happened while unwinding from it.
#[derive(Debug)]
pub struct RunFailure {
    pub error: DenormaliseError,
    pub suppressed: Option<DropError>,
}

impl RunFailure {
    pub fn with_suppressed(error: DenormaliseError, suppressed: DropError) -> Self {
        Self {
            error,
            suppressed: Some(suppressed),
        }
    }
}

impl From<DenormaliseError> for RunFailure {
    fn from(error: DenormaliseError) -> Self {
        Self {
            error,
            suppressed: None,
        }
    }
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        if let Some(drop) = &self.suppressed {
            write!(f, " (cleanup also failed: {drop})")?;
        }
        Ok(())
    }
}

impl std::error::Error for RunFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
