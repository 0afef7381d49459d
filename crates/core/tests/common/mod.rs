//! Scripted collaborators for orchestrator integration tests.
//!
//! None of these spawn processes; each records what it was asked to do so
//! tests can assert on call order and counts.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};

use nvptools_core::command::CommandRunner;
use nvptools_core::config::{HostCapability, ResolvedTarget, RunConfig};
use nvptools_core::error::{ExecutionError, TransformError};
use nvptools_core::lifecycle::DatabaseAdmin;
use nvptools_core::transform::{TransformRequest, Transformer};

/// Registry dump with one instance per supported server version.
pub const INSTANCE_DUMP: &str = "HKEY_LOCAL_MACHINE\\Software\\Microsoft\\Microsoft SQL Server\\Instance Names\\SQL\n    \
    NVIVO10    REG_SZ    MSSQL10_50.NVIVO10\n    \
    QSRNVIVO11    REG_SZ    MSSQL12.QSRNVIVO11";

/// Registry dump of an instance's TCP settings, port 1433.
pub const PORT_DUMP: &str = "HKEY_LOCAL_MACHINE\\SOFTWARE\\Microsoft\\Microsoft SQL Server\\NVIVO10\\MSSQLServer\\SuperSocketNetLib\\Tcp\n    \
    TcpPort    REG_SZ    1433";

pub fn injected(what: &str) -> ExecutionError {
    ExecutionError::Failed {
        argv: vec![what.to_string()],
        exit_code: Some(1),
        stdout: String::new(),
        stderr: format!("injected {what} failure"),
    }
}

// ---------------------------------------------------------------------------
// RegistryRunner
// ---------------------------------------------------------------------------

/// Answers `reg query` for the instance list and TCP settings keys.
pub struct RegistryRunner {
    pub instances: String,
    pub port: String,
    pub calls: RefCell<Vec<Vec<String>>>,
}

impl RegistryRunner {
    pub fn new(instances: &str, port: &str) -> Self {
        Self {
            instances: instances.to_string(),
            port: port.to_string(),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn standard() -> Self {
        Self::new(INSTANCE_DUMP, PORT_DUMP)
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl CommandRunner for RegistryRunner {
    fn execute(&self, argv: &[String]) -> Result<String, ExecutionError> {
        self.calls.borrow_mut().push(argv.to_vec());
        let key = argv.last().map(String::as_str).unwrap_or_default();
        if key.ends_with(r"Instance Names\SQL") {
            Ok(self.instances.clone())
        } else if key.ends_with(r"SuperSocketNetLib\Tcp") {
            Ok(self.port.clone())
        } else {
            Err(injected("unexpected command"))
        }
    }

    fn upload(&self, _: &Path, _: &str) -> Result<(), ExecutionError> {
        Err(injected("unexpected upload"))
    }

    fn download(&self, _: &str, _: &Path) -> Result<(), ExecutionError> {
        Err(injected("unexpected download"))
    }
}

// ---------------------------------------------------------------------------
// RecordingAdmin
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCall {
    Exists(String),
    Attach { base_file: PathBuf, name: String },
    Save { output: PathBuf, name: String },
    Drop(String),
}

/// In-memory [`DatabaseAdmin`] with per-primitive failure injection.
#[derive(Default)]
pub struct RecordingAdmin {
    pub existing: bool,
    pub fail_attach: bool,
    pub fail_save: bool,
    pub fail_drop: bool,
    pub calls: RefCell<Vec<AdminCall>>,
    pub targets: RefCell<Vec<ResolvedTarget>>,
}

impl RecordingAdmin {
    pub fn drop_count(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| matches!(call, AdminCall::Drop(_)))
            .count()
    }

    pub fn attached_names(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                AdminCall::Attach { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, target: &ResolvedTarget, call: AdminCall) {
        self.targets.borrow_mut().push(target.clone());
        self.calls.borrow_mut().push(call);
    }
}

impl DatabaseAdmin for RecordingAdmin {
    fn exists(&self, target: &ResolvedTarget, name: &str) -> Result<bool, ExecutionError> {
        self.record(target, AdminCall::Exists(name.to_string()));
        Ok(self.existing)
    }

    fn attach(
        &self,
        target: &ResolvedTarget,
        base_file: &Path,
        name: &str,
    ) -> Result<(), ExecutionError> {
        self.record(
            target,
            AdminCall::Attach {
                base_file: base_file.to_path_buf(),
                name: name.to_string(),
            },
        );
        if self.fail_attach {
            return Err(injected("attach"));
        }
        Ok(())
    }

    fn save(
        &self,
        target: &ResolvedTarget,
        output: &Path,
        name: &str,
    ) -> Result<(), ExecutionError> {
        self.record(
            target,
            AdminCall::Save {
                output: output.to_path_buf(),
                name: name.to_string(),
            },
        );
        if self.fail_save {
            return Err(injected("save"));
        }
        Ok(())
    }

    fn drop_database(&self, target: &ResolvedTarget, name: &str) -> Result<(), ExecutionError> {
        self.record(target, AdminCall::Drop(name.to_string()));
        if self.fail_drop {
            return Err(injected("drop"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// StubTransformer
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct StubTransformer {
    pub fail: bool,
    pub panic: bool,
    pub requests: RefCell<Vec<serde_json::Value>>,
    pub calls: Cell<usize>,
}

impl StubTransformer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }
}

impl Transformer for StubTransformer {
    fn transform(&self, request: &TransformRequest) -> Result<(), TransformError> {
        self.calls.set(self.calls.get() + 1);
        self.requests
            .borrow_mut()
            .push(serde_json::to_value(request).expect("request serializes"));
        if self.panic {
            panic!("transform blew up");
        }
        if self.fail {
            return Err(TransformError::Failed {
                exit_code: Some(1),
                stderr: "no such table: Node".to_string(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Local run against `dir`: creates `dir/emptyNVivo10Win.nvp` and points the
/// input at `dir/A.norm`. Comments are off unless a test turns them on.
pub fn local_config(dir: &Path) -> RunConfig {
    std::fs::write(dir.join("emptyNVivo10Win.nvp"), b"template").expect("write template");
    std::fs::write(dir.join("emptyNVivo11Win.nvp"), b"template").expect("write template");

    let mut config = RunConfig::new(dir.join("A.norm"));
    config.template_dir = dir.to_path_buf();
    config.capability = HostCapability { local_server: true };
    config.write_comments = false;
    config
}
