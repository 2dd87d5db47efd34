//! Store context resolution for tollgate.
//!
//! Every process that participates in admission control must agree on one
//! store root. It is resolved, in order, from an explicit path (the `--store`
//! flag), the `TOLLGATE_STORE` environment variable, or `./.tollgate`.

use crate::error::{Result, TollgateError};
use crate::model::Target;
use std::env;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Environment variable naming the store root.
pub const STORE_ENV_VAR: &str = "TOLLGATE_STORE";

/// Default store directory relative to the working directory.
pub const DEFAULT_STORE_DIR: &str = ".tollgate";

/// Resolved paths of a tollgate store. All paths are absolute.
#[derive(Debug, Clone)]
pub struct StoreContext {
    /// The store root.
    pub root: PathBuf,

    /// One JSON record per event (`<root>/events/`).
    pub events_dir: PathBuf,

    /// One JSON record per block (`<root>/blocks/`).
    pub blocks_dir: PathBuf,

    /// Cancellation markers (`<root>/cancel/`).
    pub cancel_dir: PathBuf,

    /// Target locks and mutation guards (`<root>/locks/`).
    pub locks_dir: PathBuf,

    /// Transition journal (`<root>/journal/`).
    pub journal_dir: PathBuf,
}

impl StoreContext {
    /// Build the context for a store rooted at `root`.
    ///
    /// Relative roots are resolved against the current working directory so
    /// paths stay valid if the process later changes directory.
    pub fn at<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        let root = if root.is_absolute() {
            root.to_path_buf()
        } else {
            env::current_dir()
                .map_err(|e| {
                    TollgateError::Store(format!("failed to get current working directory: {}", e))
                })?
                .join(root)
        };

        Ok(Self {
            events_dir: root.join("events"),
            blocks_dir: root.join("blocks"),
            cancel_dir: root.join("cancel"),
            locks_dir: root.join("locks"),
            journal_dir: root.join("journal"),
            root,
        })
    }

    /// Resolve the store from an explicit path, the environment, or the default.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::at(path);
        }
        match env::var(STORE_ENV_VAR) {
            Ok(path) if !path.trim().is_empty() => Self::at(path.trim()),
            _ => Self::at(DEFAULT_STORE_DIR),
        }
    }

    /// Whether the store layout exists.
    pub fn is_initialized(&self) -> bool {
        self.root.is_dir() && self.events_dir.is_dir() && self.locks_dir.is_dir()
    }

    /// Ensure the store is initialized, returning an error if not.
    pub fn ensure_initialized(&self) -> Result<()> {
        if !self.is_initialized() {
            return Err(TollgateError::InvalidInput(format!(
                "tollgate store not initialized.\n\
                 Expected store at: {}\n\n\
                 Run `tollgate init` (or pass --store / set {}) first.",
                self.root.display(),
                STORE_ENV_VAR
            )));
        }
        Ok(())
    }

    /// Create every store directory. Existing directories are left alone.
    pub fn create_layout(&self) -> Result<()> {
        for dir in [
            &self.root,
            &self.events_dir,
            &self.blocks_dir,
            &self.cancel_dir,
            &self.locks_dir,
            &self.journal_dir,
        ] {
            std::fs::create_dir_all(dir).map_err(|e| {
                TollgateError::Store(format!(
                    "failed to create store directory '{}': {}",
                    dir.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.yaml")
    }

    pub fn event_path(&self, id: &Uuid) -> PathBuf {
        self.events_dir.join(format!("{}.json", id))
    }

    pub fn block_path(&self, id: &Uuid) -> PathBuf {
        self.blocks_dir.join(format!("{}.json", id))
    }

    pub fn cancel_path(&self, id: &Uuid) -> PathBuf {
        self.cancel_dir.join(format!("{}.json", id))
    }

    /// Lock file guarding `target`.
    pub fn target_lock_path(&self, target: &Target) -> PathBuf {
        self.locks_dir.join(format!("{}.lock", target.lock_key()))
    }

    /// Short-lived mutation guard for a named record.
    pub fn guard_path(&self, name: &str) -> PathBuf {
        self.locks_dir.join(format!("{}.guard", name))
    }

    pub fn journal_file(&self) -> PathBuf {
        self.journal_dir.join("journal.ndjson")
    }
}

/// Resolve the store and require that it is initialized.
pub fn require_initialized_store(explicit: Option<&Path>) -> Result<StoreContext> {
    let ctx = StoreContext::resolve(explicit)?;
    ctx.ensure_initialized()?;
    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_layout_paths() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = StoreContext::at(temp_dir.path()).unwrap();

        assert_eq!(ctx.root, temp_dir.path());
        assert_eq!(ctx.events_dir, temp_dir.path().join("events"));
        assert_eq!(ctx.locks_dir, temp_dir.path().join("locks"));
        assert_eq!(ctx.config_path(), temp_dir.path().join("config.yaml"));
        assert!(ctx.journal_file().ends_with("journal/journal.ndjson"));
    }

    #[test]
    fn test_record_paths_use_id() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = StoreContext::at(temp_dir.path()).unwrap();
        let id = Uuid::now_v7();

        assert_eq!(
            ctx.event_path(&id),
            ctx.events_dir.join(format!("{}.json", id))
        );
        assert!(ctx.cancel_path(&id).starts_with(&ctx.cancel_dir));
        assert!(ctx.block_path(&id).starts_with(&ctx.blocks_dir));
    }

    #[test]
    fn test_target_lock_path_uses_lock_key() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = StoreContext::at(temp_dir.path()).unwrap();
        let path = ctx.target_lock_path(&Target::new("app", "foo"));

        assert_eq!(path, ctx.locks_dir.join("app--foo.lock"));
        assert_eq!(ctx.guard_path("block-1"), ctx.locks_dir.join("block-1.guard"));
    }

    #[test]
    fn test_uninitialized_store_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = StoreContext::at(temp_dir.path().join("missing")).unwrap();

        assert!(!ctx.is_initialized());
        let err = ctx.ensure_initialized().unwrap_err();
        assert!(err.to_string().contains("tollgate init"));
    }

    #[test]
    fn test_create_layout_initializes() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = StoreContext::at(temp_dir.path().join("store")).unwrap();

        ctx.create_layout().unwrap();
        assert!(ctx.is_initialized());
        assert!(ctx.cancel_dir.is_dir());
        // Idempotent.
        ctx.create_layout().unwrap();
    }

    #[test]
    #[serial]
    fn test_resolve_prefers_explicit_over_env() {
        let explicit = TempDir::new().unwrap();
        let from_env = TempDir::new().unwrap();
        unsafe { env::set_var(STORE_ENV_VAR, from_env.path()) };

        let ctx = StoreContext::resolve(Some(explicit.path())).unwrap();
        assert_eq!(ctx.root, explicit.path());

        let ctx = StoreContext::resolve(None).unwrap();
        assert_eq!(ctx.root, from_env.path());

        unsafe { env::remove_var(STORE_ENV_VAR) };
    }

    #[test]
    #[serial]
    fn test_resolve_defaults_to_dot_dir() {
        unsafe { env::remove_var(STORE_ENV_VAR) };
        let ctx = StoreContext::resolve(None).unwrap();
        assert!(ctx.root.ends_with(DEFAULT_STORE_DIR));
        assert!(ctx.root.is_absolute());
    }
}
