//! Exclusive-create writes.
//!
//! `create_new` is the store's compare-and-swap: of any number of processes
//! racing to create the same path, exactly one succeeds. Target locks, cancel
//! markers and record-mutation guards are all built on it.

use crate::error::{Result, TollgateError};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;

/// Outcome of an exclusive create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// This caller created the file and owns it.
    Created,
    /// The file already existed; nothing was written.
    AlreadyExists,
}

/// Create `path` exclusively and write `content` into it.
///
/// If writing or syncing fails after the create succeeded, the partially
/// written file is removed again so the slot is not leaked.
pub fn create_exclusive<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<CreateOutcome> {
    let path = path.as_ref();

    if let Some(parent) = path.parent()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| {
            TollgateError::Store(format!(
                "failed to create directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Ok(CreateOutcome::AlreadyExists);
        }
        Err(e) => {
            return Err(TollgateError::Store(format!(
                "failed to create '{}': {}",
                path.display(),
                e
            )));
        }
    };

    file.write_all(content).map_err(|e| {
        let _ = fs::remove_file(path);
        TollgateError::Store(format!("failed to write '{}': {}", path.display(), e))
    })?;

    file.sync_all().map_err(|e| {
        let _ = fs::remove_file(path);
        TollgateError::Store(format!("failed to sync '{}': {}", path.display(), e))
    })?;

    Ok(CreateOutcome::Created)
}
