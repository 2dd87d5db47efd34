//! Lock information structures.

use super::metadata::LockMetadata;
use std::path::PathBuf;

/// Information about a held target lock.
#[derive(Debug, Clone)]
pub struct LockInfo {
    /// The lock file path.
    pub path: PathBuf,

    /// The lock metadata, or `None` for a torn lock whose file could not be
    /// parsed.
    pub metadata: Option<LockMetadata>,

    /// Whether the lock is older than the configured stale threshold.
    pub is_stale: bool,
}

impl LockInfo {
    /// The locked target, or the lock file's key when the metadata is torn.
    pub fn label(&self) -> String {
        match &self.metadata {
            Some(meta) => meta.target.to_string(),
            None => self
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }
}

impl std::fmt::Display for LockInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stale = if self.is_stale { ", STALE" } else { "" };
        match &self.metadata {
            Some(meta) => write!(
                f,
                "{} (event: {}, kind: {}, owner: {}, age: {}{})",
                meta.target,
                meta.event_id,
                meta.kind,
                meta.owner,
                meta.age_string(),
                stale
            ),
            None => write!(f, "{} (unreadable (torn) lock{})", self.label(), stale),
        }
    }
}
