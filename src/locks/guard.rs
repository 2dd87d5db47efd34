//! RAII mutation guard implementation.

use crate::error::{Result, TollgateError};
use std::fs;
use std::path::{Path, PathBuf};

/// RAII guard for a record-mutation guard file.
///
/// When dropped, the guard file is deleted. If deletion fails, a warning is
/// logged but no panic occurs.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    released: bool,
}

impl LockGuard {
    pub(super) fn new(path: PathBuf) -> Self {
        Self {
            path,
            released: false,
        }
    }

    /// Get the path to the guard file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the guard before it goes out of scope, surfacing errors.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        fs::remove_file(&self.path).map_err(|e| {
            TollgateError::Store(format!(
                "failed to release guard '{}': {}",
                self.path.display(),
                e
            ))
        })
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = fs::remove_file(&self.path)
        {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release guard");
        }
    }
}
