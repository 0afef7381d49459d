//! Run configuration consumed by the orchestrator.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Extension of the project files the pipeline produces.
pub const OUTPUT_EXTENSION: &str = "nvp";

/// Extension of the comments sidecar written next to the output.
pub const SIDECAR_EXTENSION: &str = "log";

pub const DEFAULT_DB_USER: &str = "nvivotools";
pub const DEFAULT_DB_PASSWORD: &str = "nvivotools";

// ---------------------------------------------------------------------------
// ProductVersion
// ---------------------------------------------------------------------------

/// Target product release. Each maps to exactly one database server
/// version and one empty template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProductVersion {
    #[default]
    V10,
    V11,
}

impl ProductVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V10 => "10",
            Self::V11 => "11",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s {
            "10" => Ok(Self::V10),
            "11" => Ok(Self::V11),
            _ => Err(ConfigError::UnknownProductVersion(s.to_string())),
        }
    }

    /// Leading component of the server's registry version token.
    pub fn server_version_token(&self) -> &'static str {
        match self {
            Self::V10 => "MSSQL10_50",
            Self::V11 => "MSSQL12",
        }
    }

    pub fn template_file_name(&self) -> &'static str {
        match self {
            Self::V10 => "emptyNVivo10Win.nvp",
            Self::V11 => "emptyNVivo11Win.nvp",
        }
    }
}

impl std::fmt::Display for ProductVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Caller-supplied connection hints; any subset may be present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionTarget {
    /// Remote host; `None` means this machine.
    pub host: Option<String>,
    pub port: Option<u16>,
    pub instance: Option<String>,
}

/// Connection after discovery: instance and port are always known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub host: Option<String>,
    pub instance: String,
    pub port: u16,
}

impl ResolvedTarget {
    /// Host name for clients connecting from this machine.
    pub fn client_host(&self) -> &str {
        self.host.as_deref().unwrap_or("localhost")
    }
}

/// Whether a database server is reachable without naming a remote host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HostCapability {
    pub local_server: bool,
}

/// Credentials passed through to the transform's database connection.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            user: DEFAULT_DB_USER.to_string(),
            password: DEFAULT_DB_PASSWORD.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// RunConfig
// ---------------------------------------------------------------------------

/// Everything one orchestration run needs.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Normalized snapshot to read.
    pub input: PathBuf,
    /// Output project file; derived from `input` when `None`.
    pub output: Option<PathBuf>,
    /// Template override; `template_dir` + the version's default otherwise.
    pub template: Option<PathBuf>,
    pub template_dir: PathBuf,
    pub product_version: ProductVersion,
    pub target: ConnectionTarget,
    pub capability: HostCapability,
    pub credentials: Credentials,
    /// Raw `(category, action)` choices, validated into a `MergePolicy`.
    pub choices: Vec<(String, String)>,
    /// Write the comments sidecar next to the output.
    pub write_comments: bool,
    /// Program name recorded in the comments sidecar.
    pub program_name: String,
}

impl RunConfig {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: None,
            template: None,
            template_dir: PathBuf::from("."),
            product_version: ProductVersion::default(),
            target: ConnectionTarget::default(),
            capability: HostCapability::default(),
            credentials: Credentials::default(),
            choices: Vec::new(),
            write_comments: true,
            program_name: "denormalise-nvp".to_string(),
        }
    }

    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| derive_output_path(&self.input))
    }

    pub fn template_path(&self) -> PathBuf {
        self.template.clone().unwrap_or_else(|| {
            self.template_dir
                .join(self.product_version.template_file_name())
        })
    }
}

/// `input` with its extension replaced by the project file extension.
pub fn derive_output_path(input: &Path) -> PathBuf {
    input.with_extension(OUTPUT_EXTENSION)
}

/// Sidecar log path for an output file.
pub fn sidecar_path(output: &Path) -> PathBuf {
    output.with_extension(SIDECAR_EXTENSION)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
