//! [`DatabaseAdmin`] implemented with `sqlcmd`.
//!
//! Every command runs through a [`CommandRunner`], i.e. on the database host
//! itself, so the server is always addressed as `127.0.0.1` on the resolved
//! port. Staged database files live on that host; the template and the
//! output are files on this machine, moved with the runner's transfers.

use std::path::Path;

use tracing::debug;

use crate::command::{argv, CommandRunner};
use crate::config::ResolvedTarget;
use crate::error::ExecutionError;
use crate::lifecycle::DatabaseAdmin;

/// Server-side directory for staged database files when none is configured.
pub const DEFAULT_WORK_DIR: &str = r"C:\Windows\Temp";

pub struct SqlcmdAdmin<'a> {
    runner: &'a dyn CommandRunner,
    work_dir: String,
}

impl<'a> SqlcmdAdmin<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self {
            runner,
            work_dir: DEFAULT_WORK_DIR.to_string(),
        }
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<String>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    /// Staged data file for database `name`.
    pub fn staged_file(&self, name: &str) -> String {
        format!("{}\\{name}.mdf", self.work_dir.trim_end_matches('\\'))
    }

    fn query(&self, target: &ResolvedTarget, sql: &str) -> Result<String, ExecutionError> {
        debug!(sql, "Running sqlcmd query");
        self.runner.execute(&argv([
            "sqlcmd".to_string(),
            "-S".to_string(),
            format!("tcp:127.0.0.1,{}", target.port),
            "-E".to_string(),
            "-b".to_string(),
            "-h".to_string(),
            "-1".to_string(),
            "-Q".to_string(),
            sql.to_string(),
        ]))
    }

    fn attach_file(&self, target: &ResolvedTarget, name: &str) -> Result<(), ExecutionError> {
        let sql = format!(
            "SET NOCOUNT ON; CREATE DATABASE {} ON (FILENAME = N'{}') FOR ATTACH_REBUILD_LOG",
            bracket(name),
            escape_literal(&self.staged_file(name)),
        );
        self.query(target, &sql).map(drop)
    }
}

impl DatabaseAdmin for SqlcmdAdmin<'_> {
    fn exists(&self, target: &ResolvedTarget, name: &str) -> Result<bool, ExecutionError> {
        let sql = format!(
            "SET NOCOUNT ON; SELECT COUNT(*) FROM sys.databases WHERE name = N'{}'",
            escape_literal(name)
        );
        let output = self.query(target, &sql)?;
        Ok(output.trim() != "0")
    }

    fn attach(
        &self,
        target: &ResolvedTarget,
        base_file: &Path,
        name: &str,
    ) -> Result<(), ExecutionError> {
        self.runner.upload(base_file, &self.staged_file(name))?;
        self.attach_file(target, name)
    }

    fn save(
        &self,
        target: &ResolvedTarget,
        output: &Path,
        name: &str,
    ) -> Result<(), ExecutionError> {
        let detach = format!(
            "SET NOCOUNT ON; ALTER DATABASE {0} SET SINGLE_USER WITH ROLLBACK IMMEDIATE; EXEC sp_detach_db N'{1}'",
            bracket(name),
            escape_literal(name),
        );
        self.query(target, &detach)?;
        let copied = self.runner.download(&self.staged_file(name), output);
        // Re-attach regardless so the drop step finds the database.
        let reattached = self.attach_file(target, name);
        copied.and(reattached)
    }

    fn drop_database(&self, target: &ResolvedTarget, name: &str) -> Result<(), ExecutionError> {
        let sql = format!(
            "SET NOCOUNT ON; IF DB_ID(N'{0}') IS NOT NULL BEGIN \
             ALTER DATABASE {1} SET SINGLE_USER WITH ROLLBACK IMMEDIATE; DROP DATABASE {1} END",
            escape_literal(name),
            bracket(name),
        );
        self.query(target, &sql)?;

        let staged = self.staged_file(name);
        self.runner
            .execute(&argv([
                "cmd",
                "/C",
                "if",
                "exist",
                staged.as_str(),
                "del",
                "/Q",
                staged.as_str(),
            ]))
            .map(drop)
    }
}

fn bracket(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
