//! Ephemeral working-database lifecycle.
//!
//! A template project is attached under a per-invocation name, transformed,
//! saved to the output file and dropped. [`WorkingDatabase`] is the scoped
//! handle for an attached database: dropping it (or calling
//! [`WorkingDatabase::release`]) tears the database down exactly once on
//! every exit path.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{error, info, warn};

use crate::config::ResolvedTarget;
use crate::error::{AttachError, DropError, ExecutionError, SaveError};

/// Prefix of every working database name.
pub const DATABASE_NAME_PREFIX: &str = "nvivo";

static NAME_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Derive a working database name unique to this invocation.
///
/// Recognisable on the server (`nvivo<pid>_<n>`); the process id separates
/// concurrent invocations and the sequence separates derivations within one
/// process. Uniqueness is best effort, not a server-side lock.
pub fn derive_database_name() -> String {
    let seq = NAME_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{DATABASE_NAME_PREFIX}{}_{seq}", std::process::id())
}

// ---------------------------------------------------------------------------
// DatabaseAdmin
// ---------------------------------------------------------------------------

/// Low-level primitives for working databases on a server.
pub trait DatabaseAdmin {
    /// Whether a database called `name` already exists.
    fn exists(&self, target: &ResolvedTarget, name: &str) -> Result<bool, ExecutionError>;

    /// Load a copy of `base_file` as database `name`.
    fn attach(
        &self,
        target: &ResolvedTarget,
        base_file: &Path,
        name: &str,
    ) -> Result<(), ExecutionError>;

    /// Export database `name` to `output`.
    fn save(&self, target: &ResolvedTarget, output: &Path, name: &str)
        -> Result<(), ExecutionError>;

    /// Remove database `name` and anything staged for it. Must tolerate a
    /// partially attached database.
    fn drop_database(&self, target: &ResolvedTarget, name: &str) -> Result<(), ExecutionError>;
}

// ---------------------------------------------------------------------------
// EphemeralDatabase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseState {
    Unattached,
    Attached,
    Saved,
    Dropped,
}

impl DatabaseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unattached => "unattached",
            Self::Attached => "attached",
            Self::Saved => "saved",
            Self::Dropped => "dropped",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EphemeralDatabase {
    name: String,
    base_file: PathBuf,
    state: DatabaseState,
}

impl EphemeralDatabase {
    /// New unattached database with a freshly derived name.
    pub fn new(base_file: impl Into<PathBuf>) -> Self {
        Self::named(derive_database_name(), base_file)
    }

    pub fn named(name: impl Into<String>, base_file: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            base_file: base_file.into(),
            state: DatabaseState::Unattached,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_file(&self) -> &Path {
        &self.base_file
    }

    pub fn state(&self) -> DatabaseState {
        self.state
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

pub struct EphemeralDatabaseLifecycle<'a> {
    admin: &'a dyn DatabaseAdmin,
    target: &'a ResolvedTarget,
}

impl<'a> EphemeralDatabaseLifecycle<'a> {
    pub fn new(admin: &'a dyn DatabaseAdmin, target: &'a ResolvedTarget) -> Self {
        Self { admin, target }
    }

    /// Attach `database`'s template under its name.
    ///
    /// A name that already exists on the server is refused without touching
    /// it. Any other failure drops whatever was partially created before
    /// the error is returned.
    pub fn attach(
        &self,
        mut database: EphemeralDatabase,
    ) -> Result<WorkingDatabase<'a>, AttachError> {
        let name = database.name.clone();

        let exists = self
            .admin
            .exists(self.target, &name)
            .map_err(|source| AttachError::Failed {
                name: name.clone(),
                source,
            })?;
        if exists {
            return Err(AttachError::NameCollision(name));
        }

        if let Err(source) = self.admin.attach(self.target, &database.base_file, &name) {
            if let Err(drop_err) = self.admin.drop_database(self.target, &name) {
                warn!(database = %name, error = %drop_err, "Cleanup after failed attach also failed");
            }
            return Err(AttachError::Failed { name, source });
        }

        database.state = DatabaseState::Attached;
        info!(database = %name, template = %database.base_file.display(), "Attached working database");

        Ok(WorkingDatabase {
            admin: self.admin,
            target: self.target,
            database,
        })
    }
}

/// An attached working database. Torn down when released or dropped.
pub struct WorkingDatabase<'a> {
    admin: &'a dyn DatabaseAdmin,
    target: &'a ResolvedTarget,
    database: EphemeralDatabase,
}

impl std::fmt::Debug for WorkingDatabase<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkingDatabase")
            .field("database", &self.database)
            .field("target", self.target)
            .finish_non_exhaustive()
    }
}

impl WorkingDatabase<'_> {
    pub fn name(&self) -> &str {
        self.database.name()
    }

    pub fn state(&self) -> DatabaseState {
        self.database.state
    }

    /// Export the transformed database to `output`.
    pub fn save(&mut self, output: &Path) -> Result<(), SaveError> {
        if self.database.state != DatabaseState::Attached {
            return Err(SaveError::InvalidState {
                name: self.database.name.clone(),
                state: self.database.state.as_str(),
            });
        }

        self.admin
            .save(self.target, output, &self.database.name)
            .map_err(|source| SaveError::Failed {
                name: self.database.name.clone(),
                output: output.to_path_buf(),
                source,
            })?;

        self.database.state = DatabaseState::Saved;
        info!(database = %self.database.name, output = %output.display(), "Saved working database");
        Ok(())
    }

    /// Drop the database now and report the outcome.
    pub fn release(mut self) -> Result<(), DropError> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<(), DropError> {
        if self.database.state == DatabaseState::Dropped {
            return Ok(());
        }
        self.database.state = DatabaseState::Dropped;

        self.admin
            .drop_database(self.target, &self.database.name)
            .map_err(|source| DropError {
                name: self.database.name.clone(),
                source,
            })?;

        info!(database = %self.database.name, "Dropped working database");
        Ok(())
    }
}

impl Drop for WorkingDatabase<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.teardown() {
            error!(error = %err, "Working database was not dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use assert_matches::assert_matches;

    use super::*;

    #[derive(Default)]
    struct FakeAdmin {
        existing: bool,
        fail_attach: bool,
        fail_save: bool,
        fail_drop: bool,
        drops: Cell<usize>,
        saved_to: RefCell<Option<PathBuf>>,
    }

    fn failure() -> ExecutionError {
        ExecutionError::Failed {
            argv: vec!["sqlcmd".into()],
            exit_code: Some(1),
            stdout: String::new(),
            stderr: "injected".into(),
        }
    }

    impl DatabaseAdmin for FakeAdmin {
        fn exists(&self, _: &ResolvedTarget, _: &str) -> Result<bool, ExecutionError> {
            Ok(self.existing)
        }

        fn attach(&self, _: &ResolvedTarget, _: &Path, _: &str) -> Result<(), ExecutionError> {
            if self.fail_attach {
                Err(failure())
            } else {
                Ok(())
            }
        }

        fn save(&self, _: &ResolvedTarget, output: &Path, _: &str) -> Result<(), ExecutionError> {
            if self.fail_save {
                return Err(failure());
            }
            *self.saved_to.borrow_mut() = Some(output.to_path_buf());
            Ok(())
        }

        fn drop_database(&self, _: &ResolvedTarget, _: &str) -> Result<(), ExecutionError> {
            self.drops.set(self.drops.get() + 1);
            if self.fail_drop {
                Err(failure())
            } else {
                Ok(())
            }
        }
    }

    fn target() -> ResolvedTarget {
        ResolvedTarget {
            host: None,
            instance: "NVIVO10".into(),
            port: 1433,
        }
    }

    #[test]
    fn derived_names_are_unique_within_a_process() {
        let first = derive_database_name();
        let second = derive_database_name();
        assert_ne!(first, second);
        assert!(first.starts_with(DATABASE_NAME_PREFIX));
        assert!(first.contains(&std::process::id().to_string()));
    }

    #[test]
    fn new_database_is_unattached() {
        let db = EphemeralDatabase::new("template.nvp");
        assert_eq!(db.state(), DatabaseState::Unattached);
        assert_eq!(db.base_file(), Path::new("template.nvp"));
    }

    #[test]
    fn attach_save_release_walks_all_states() {
        let admin = FakeAdmin::default();
        let target = target();
        let lifecycle = EphemeralDatabaseLifecycle::new(&admin, &target);

        let mut db = lifecycle
            .attach(EphemeralDatabase::named("nvivo1", "t.nvp"))
            .expect("attach");
        assert_eq!(db.state(), DatabaseState::Attached);

        db.save(Path::new("out.nvp")).expect("save");
        assert_eq!(db.state(), DatabaseState::Saved);
        assert_eq!(admin.saved_to.borrow().as_deref(), Some(Path::new("out.nvp")));

        db.release().expect("release");
        assert_eq!(admin.drops.get(), 1);
    }

    #[test]
    fn dropping_handle_tears_down_once() {
        let admin = FakeAdmin::default();
        let target = target();
        let lifecycle = EphemeralDatabaseLifecycle::new(&admin, &target);
        {
            let _db = lifecycle
                .attach(EphemeralDatabase::named("nvivo1", "t.nvp"))
                .expect("attach");
        }
        assert_eq!(admin.drops.get(), 1);
    }

    #[test]
    fn save_twice_is_invalid_state() {
        let admin = FakeAdmin::default();
        let target = target();
        let lifecycle = EphemeralDatabaseLifecycle::new(&admin, &target);
        let mut db = lifecycle
            .attach(EphemeralDatabase::named("nvivo1", "t.nvp"))
            .expect("attach");
        db.save(Path::new("out.nvp")).expect("save");
        assert_matches!(
            db.save(Path::new("out.nvp")),
            Err(SaveError::InvalidState { state: "saved", .. })
        );
        drop(db);
        assert_eq!(admin.drops.get(), 1);
    }

    #[test]
    fn failed_save_still_drops_once() {
        let admin = FakeAdmin {
            fail_save: true,
            ..Default::default()
        };
        let target = target();
        let lifecycle = EphemeralDatabaseLifecycle::new(&admin, &target);
        let mut db = lifecycle
            .attach(EphemeralDatabase::named("nvivo1", "t.nvp"))
            .expect("attach");
        assert_matches!(db.save(Path::new("out.nvp")), Err(SaveError::Failed { .. }));
        assert_eq!(db.state(), DatabaseState::Attached);
        db.release().expect("release");
        assert_eq!(admin.drops.get(), 1);
    }

    #[test]
    fn release_reports_drop_failure_and_does_not_retry() {
        let admin = FakeAdmin {
            fail_drop: true,
            ..Default::default()
        };
        let target = target();
        let lifecycle = EphemeralDatabaseLifecycle::new(&admin, &target);
        let db = lifecycle
            .attach(EphemeralDatabase::named("nvivo1", "t.nvp"))
            .expect("attach");
        let err = db.release().expect_err("drop should fail");
        assert_eq!(err.name, "nvivo1");
        assert_eq!(admin.drops.get(), 1);
    }

    #[test]
    fn failed_attach_cleans_up_once() {
        let admin = FakeAdmin {
            fail_attach: true,
            ..Default::default()
        };
        let target = target();
        let lifecycle = EphemeralDatabaseLifecycle::new(&admin, &target);
        let result = lifecycle.attach(EphemeralDatabase::named("nvivo1", "t.nvp"));
        assert_matches!(result, Err(AttachError::Failed { .. }));
        assert_eq!(admin.drops.get(), 1);
    }

    #[test]
    fn failed_cleanup_does_not_mask_attach_error() {
        let admin = FakeAdmin {
            fail_attach: true,
            fail_drop: true,
            ..Default::default()
        };
        let target = target();
        let lifecycle = EphemeralDatabaseLifecycle::new(&admin, &target);
        let result = lifecycle.attach(EphemeralDatabase::named("nvivo1", "t.nvp"));
        assert_matches!(result, Err(AttachError::Failed { ref name, .. }) if name == "nvivo1");
        assert_eq!(admin.drops.get(), 1);
    }

    #[test]
    fn name_collision_leaves_existing_database_alone() {
        let admin = FakeAdmin {
            existing: true,
            ..Default::default()
        };
        let target = target();
        let lifecycle = EphemeralDatabaseLifecycle::new(&admin, &target);
        let result = lifecycle.attach(EphemeralDatabase::named("nvivo1", "t.nvp"));
        assert_matches!(result, Err(AttachError::NameCollision(ref name)) if name == "nvivo1");
        assert_eq!(admin.drops.get(), 0);
    }
}
