//! Atomic record replacement for the shared store.
//!
//! Every mutable record (event, block, cancel marker, config) is rewritten with
//! the same pattern so readers in other processes never observe a partial file:
//! 1. Write content to a temporary file in the same directory
//! 2. Sync the file to disk (fsync)
//! 3. Atomically rename it over the original
//!
//! Source and destination must be on the same filesystem for the rename to be
//! atomic, which holds because the temporary file lives next to its target.
//! Temporary names carry the process id and a random suffix so concurrent
//! writers in different processes never share a temporary file.

use super::CreateOutcome;
use crate::error::{Result, TollgateError};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Atomically write bytes to a file.
///
/// The target file is either left untouched or fully replaced.
pub fn atomic_write<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| {
            TollgateError::Store(format!(
                "failed to create parent directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    let temp_path = generate_temp_path(path)?;
    write_and_sync(&temp_path, content)?;
    atomic_replace(&temp_path, path)?;

    Ok(())
}

/// Serialize a value as pretty JSON and atomically write it.
pub fn atomic_write_json<P: AsRef<Path>, T: serde::Serialize>(path: P, value: &T) -> Result<()> {
    let path = path.as_ref();
    let json = serde_json::to_vec_pretty(value).map_err(|e| {
        TollgateError::Store(format!(
            "failed to serialize record '{}': {}",
            path.display(),
            e
        ))
    })?;
    atomic_write(path, &json)
}

/// Atomically create `path` with `content`, failing if it already exists.
///
/// The content is written and synced under a temporary name first and then
/// hard-linked into place, which never replaces an existing file. Readers
/// therefore see either no file or the complete content, even if the writer
/// dies halfway.
pub fn atomic_create<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<CreateOutcome> {
    let path = path.as_ref();

    if let Some(parent) = path.parent()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| {
            TollgateError::Store(format!(
                "failed to create parent directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    let temp_path = generate_temp_path(path)?;
    write_and_sync(&temp_path, content)?;

    let linked = fs::hard_link(&temp_path, path);
    let _ = fs::remove_file(&temp_path);
    match linked {
        Ok(()) => Ok(CreateOutcome::Created),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(CreateOutcome::AlreadyExists),
        Err(e) => Err(TollgateError::Store(format!(
            "failed to create '{}': {}",
            path.display(),
            e
        ))),
    }
}

/// Generate a temporary file path in the same directory as the target.
fn generate_temp_path(target: &Path) -> Result<PathBuf> {
    let parent = target.parent().unwrap_or(Path::new("."));
    let filename = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| TollgateError::Store("invalid file path".to_string()))?;

    let temp_name = format!(
        ".{}.{}.{}.tmp",
        filename,
        std::process::id(),
        Uuid::new_v4().simple()
    );
    Ok(parent.join(temp_name))
}

fn write_and_sync(path: &Path, content: &[u8]) -> Result<()> {
    let mut file = File::create(path).map_err(|e| {
        TollgateError::Store(format!(
            "failed to create temporary file '{}': {}",
            path.display(),
            e
        ))
    })?;

    file.write_all(content).map_err(|e| {
        let _ = fs::remove_file(path);
        TollgateError::Store(format!("failed to write to temporary file: {}", e))
    })?;

    file.sync_all().map_err(|e| {
        let _ = fs::remove_file(path);
        TollgateError::Store(format!("failed to sync temporary file to disk: {}", e))
    })?;

    Ok(())
}

#[cfg(unix)]
fn atomic_replace(source: &Path, target: &Path) -> Result<()> {
    fs::rename(source, target).map_err(|e| {
        let _ = fs::remove_file(source);
        TollgateError::Store(format!(
            "failed to atomically replace '{}': {}",
            target.display(),
            e
        ))
    })?;

    // Persist the directory entry as well.
    if let Some(parent) = target.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }

    Ok(())
}

/// `std::fs::rename` maps to `MoveFileExW` with `MOVEFILE_REPLACE_EXISTING`
/// on Windows, so it replaces an existing target there too.
#[cfg(windows)]
fn atomic_replace(source: &Path, target: &Path) -> Result<()> {
    fs::rename(source, target).map_err(|e| {
        let _ = fs::remove_file(source);
        TollgateError::Store(format!(
            "failed to atomically replace '{}': {}",
            target.display(),
            e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_new_file() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("record.json");

        atomic_write(&file_path, b"{}").unwrap();

        assert_eq!(fs::read_to_string(&file_path).unwrap(), "{}");
    }

    #[test]
    fn test_atomic_write_replace_existing() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("record.json");
        fs::write(&file_path, "original").unwrap();

        atomic_write(&file_path, b"replacement").unwrap();

        assert_eq!(fs::read_to_string(&file_path).unwrap(), "replacement");
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("events").join("nested").join("a.json");

        atomic_write(&file_path, b"nested").unwrap();

        assert_eq!(fs::read_to_string(&file_path).unwrap(), "nested");
    }

    #[test]
    fn test_atomic_write_json_is_parseable() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("value.json");

        atomic_write_json(&file_path, &serde_json::json!({"reason": "maintenance"})).unwrap();

        let parsed: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&file_path).unwrap()).unwrap();
        assert_eq!(parsed["reason"], "maintenance");
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("record.json");

        atomic_write(&file_path, b"content").unwrap();

        let leftovers: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_generate_temp_path_is_unique_and_hidden() {
        let target = Path::new("/some/path/file.json");
        let a = generate_temp_path(target).unwrap();
        let b = generate_temp_path(target).unwrap();

        assert_ne!(a, b);
        assert_eq!(a.parent().unwrap(), Path::new("/some/path"));
        let name = a.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(".file.json."));
        assert!(name.ends_with(".tmp"));
    }

    #[test]
    fn test_atomic_create_never_replaces() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("block.json");

        assert_eq!(atomic_create(&path, b"first").unwrap(), CreateOutcome::Created);
        assert_eq!(
            atomic_create(&path, b"second").unwrap(),
            CreateOutcome::AlreadyExists
        );
        assert_eq!(fs::read_to_string(&path).unwrap(), "first");

        let leftovers = fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_atomic_create_race_has_one_winner() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("race.lock");
        let barrier = std::sync::Arc::new(std::sync::Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let path = path.clone();
                let barrier = std::sync::Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    atomic_create(&path, format!("writer {}", i).as_bytes()).unwrap()
                })
            })
            .collect();

        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|o| *o == CreateOutcome::Created)
            .count();
        assert_eq!(created, 1);
        assert!(fs::read_to_string(&path).unwrap().starts_with("writer "));
    }

    #[test]
    fn test_concurrent_writers_same_target() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("shared.json");

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let path = path.clone();
                std::thread::spawn(move || {
                    atomic_write(&path, format!("writer {}", i).as_bytes()).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Whichever writer won, the file holds one complete payload.
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("writer "));
    }
}
