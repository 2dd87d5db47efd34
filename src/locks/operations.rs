//! Lock acquisition, release, listing, and clearing operations.

use super::guard::LockGuard;
use super::metadata::LockMetadata;
use super::types::LockInfo;
use crate::config::Config;
use crate::context::StoreContext;
use crate::error::{Result, TollgateError};
use crate::fs::{CreateOutcome, atomic_create, create_exclusive};
use crate::model::{Event, Target};
use chrono::{DateTime, Utc};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use uuid::Uuid;

/// Acquire the target lock on behalf of `event`.
///
/// This is the admission decision: the lock file is created exclusively, so
/// it succeeds for exactly one of any number of concurrent callers. It never
/// waits or retries. The metadata is linked into place complete, so a holder
/// that dies mid-acquire never leaves an empty lock behind.
///
/// # Returns
///
/// * `Ok(())` - The event now holds its target
/// * `Err(TollgateError::Locked)` - Another event holds the target (exit code 4)
pub fn acquire_target_lock(ctx: &StoreContext, event: &Event) -> Result<()> {
    let lock_path = ctx.target_lock_path(&event.target);
    let metadata = LockMetadata::for_event(event);
    let json = metadata.to_json()?;

    match atomic_create(&lock_path, json.as_bytes())? {
        CreateOutcome::Created => Ok(()),
        CreateOutcome::AlreadyExists => {
            // A torn lock has no readable holder; fall back to the bare target.
            let holder = match LockMetadata::from_file(&lock_path) {
                Ok(meta) => format!(
                    "\nHeld by event {} ({} by {}, {} ago)",
                    meta.event_id,
                    meta.kind,
                    meta.owner,
                    meta.age_string()
                ),
                Err(_) => String::new(),
            };
            Err(TollgateError::Locked(format!(
                "target {} already has a running event{}",
                event.target, holder
            )))
        }
    }
}

/// Read the metadata of the lock currently held on `target`, if any.
pub fn read_target_lock(ctx: &StoreContext, target: &Target) -> Result<Option<LockMetadata>> {
    let lock_path = ctx.target_lock_path(target);
    if !lock_path.exists() {
        return Ok(None);
    }
    LockMetadata::from_file(&lock_path).map(Some)
}

/// Release the lock on `target` if it is still held by `event_id`.
///
/// The lock is first renamed to a private name and only then checked, so a
/// lock installed by a newer holder after an operator clear can never be
/// deleted by a late closer. A foreign lock is linked back into place.
///
/// # Returns
///
/// * `Ok(true)` - The lock was held by `event_id` and has been removed
/// * `Ok(false)` - No lock, or a lock held by a different event (left alone)
pub fn release_target_lock(ctx: &StoreContext, target: &Target, event_id: &Uuid) -> Result<bool> {
    let lock_path = ctx.target_lock_path(target);
    let parked = ctx.locks_dir.join(format!(
        ".{}.{}.releasing",
        std::process::id(),
        Uuid::new_v4().simple()
    ));

    match fs::rename(&lock_path, &parked) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => {
            return Err(TollgateError::Store(format!(
                "failed to release lock '{}': {}",
                lock_path.display(),
                e
            )));
        }
    }

    let holder = LockMetadata::from_file(&parked).ok().map(|meta| meta.event_id);
    if holder == Some(*event_id) {
        fs::remove_file(&parked).map_err(|e| {
            TollgateError::Store(format!(
                "failed to release lock '{}': {}",
                parked.display(),
                e
            ))
        })?;
        return Ok(true);
    }

    tracing::warn!(
        target_name = %target,
        holder = ?holder,
        event_id = %event_id,
        "lock now belongs to another event, leaving it in place"
    );
    restore_parked(&parked, &lock_path)?;
    Ok(false)
}

/// Put a foreign lock set aside by [`release_target_lock`] back in place.
fn restore_parked(parked: &Path, lock_path: &Path) -> Result<()> {
    match fs::hard_link(parked, lock_path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            tracing::warn!(
                path = %lock_path.display(),
                "target was re-acquired while a foreign lock was set aside, keeping the newer lock"
            );
        }
        Err(_) => {
            return fs::rename(parked, lock_path).map_err(|e| {
                TollgateError::Store(format!(
                    "failed to restore lock '{}': {}",
                    lock_path.display(),
                    e
                ))
            });
        }
    }
    let _ = fs::remove_file(parked);
    Ok(())
}

/// Acquire a short-lived mutation guard for a named record.
///
/// # Returns
///
/// * `Ok(LockGuard)` - The guard is held until dropped
/// * `Err(TollgateError::Locked)` - Another process is mutating the record
pub fn acquire_guard(ctx: &StoreContext, name: &str, action: &str) -> Result<LockGuard> {
    let path = ctx.guard_path(name);
    let content = serde_json::json!({
        "action": action,
        "pid": std::process::id(),
        "instance": super::metadata::instance_string(),
        "created_at": chrono::Utc::now(),
    });

    match create_exclusive(&path, content.to_string().as_bytes())? {
        CreateOutcome::Created => Ok(LockGuard::new(path)),
        CreateOutcome::AlreadyExists => Err(TollgateError::Locked(format!(
            "'{}' is being modified by another process (guard: {})",
            name,
            path.display()
        ))),
    }
}

/// List all held target locks, sorted by target.
pub fn list_locks(ctx: &StoreContext, config: &Config) -> Result<Vec<LockInfo>> {
    let mut locks = Vec::new();

    if !ctx.locks_dir.exists() {
        return Ok(locks);
    }

    let entries = fs::read_dir(&ctx.locks_dir).map_err(|e| {
        TollgateError::Store(format!(
            "failed to read locks directory '{}': {}",
            ctx.locks_dir.display(),
            e
        ))
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| {
            TollgateError::Store(format!("failed to read locks directory entry: {}", e))
        })?;

        let path = entry.path();

        // Guards and temp files are not target locks.
        if path.extension().and_then(|e| e.to_str()) != Some("lock") {
            continue;
        }

        locks.push(inspect_lock(path, config));
    }

    locks.sort_by_key(|lock| lock.label());

    Ok(locks)
}

/// Remove the lock file on `target` regardless of its holder.
///
/// Torn locks (unparseable metadata) are removed as well; the returned
/// [`LockInfo`] then carries no metadata. The caller is responsible for
/// verifying that clearing the lock is appropriate (e.g. checking `--force`)
/// and for finalizing the orphaned event.
///
/// # Returns
///
/// * `Ok(LockInfo)` - Information about the cleared lock (for audit purposes)
/// * `Err(TollgateError::NotFound)` - No lock is held on `target`
pub fn clear_lock(ctx: &StoreContext, target: &Target, config: &Config) -> Result<LockInfo> {
    let lock_path = ctx.target_lock_path(target);

    if !lock_path.exists() {
        return Err(TollgateError::NotFound(format!(
            "no lock is held on {} (expected: {})",
            target,
            lock_path.display()
        )));
    }

    let info = inspect_lock(lock_path, config);

    match fs::remove_file(&info.path) {
        Ok(()) => Ok(info),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(TollgateError::NotFound(format!(
            "no lock is held on {}",
            target
        ))),
        Err(e) => Err(TollgateError::Store(format!(
            "failed to clear lock '{}': {}",
            info.path.display(),
            e
        ))),
    }
}

/// Read a lock file into a [`LockInfo`], tolerating torn metadata.
fn inspect_lock(path: std::path::PathBuf, config: &Config) -> LockInfo {
    match LockMetadata::from_file(&path) {
        Ok(metadata) => LockInfo {
            is_stale: metadata.is_stale(config.lock_stale_minutes),
            metadata: Some(metadata),
            path,
        },
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "unreadable (torn) lock file");
            LockInfo {
                is_stale: file_is_stale(&path, config.lock_stale_minutes),
                metadata: None,
                path,
            }
        }
    }
}

/// Staleness by modification time, for locks without readable metadata.
fn file_is_stale(path: &Path, stale_minutes: u32) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map(|modified| {
            let modified: DateTime<Utc> = modified.into();
            Utc::now().signed_duration_since(modified).num_minutes() > stale_minutes as i64
        })
        .unwrap_or(false)
}
