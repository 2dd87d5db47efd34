//! Block policy engine.
//!
//! A block forbids matching operations from being admitted. Every pattern
//! field is optional; an empty field matches anything, so a block with no
//! fields set stops every operation on the store.

use crate::context::StoreContext;
use crate::error::{Result, TollgateError};
use crate::fs::{CreateOutcome, atomic_create, atomic_write_json};
use crate::journal::{self, JournalAction, JournalEntry};
use crate::locks::{acquire_guard, instance_string};
use crate::model::Target;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use uuid::Uuid;

/// An administrator-defined prohibition rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: Uuid,
    #[serde(default)]
    pub kind_name: String,
    #[serde(default)]
    pub owner_name: String,
    #[serde(default)]
    pub target_type: String,
    #[serde(default)]
    pub target_value: String,
    pub reason: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

impl Block {
    pub fn active(&self) -> bool {
        self.end_time.is_none()
    }

    /// Whether every non-empty pattern field equals the operation's value.
    pub fn matches(&self, kind: &str, owner: &str, target: &Target) -> bool {
        fn field(pattern: &str, value: &str) -> bool {
            pattern.is_empty() || pattern == value
        }
        field(&self.kind_name, kind)
            && field(&self.owner_name, owner)
            && field(&self.target_type, &target.target_type)
            && field(&self.target_value, &target.value)
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn or_any(s: &str) -> &str {
            if s.is_empty() { "*" } else { s }
        }
        write!(
            f,
            "block {} (kind: {}, owner: {}, target: {}:{}) reason: {}",
            self.id,
            or_any(&self.kind_name),
            or_any(&self.owner_name),
            or_any(&self.target_type),
            or_any(&self.target_value),
            self.reason
        )
    }
}

/// Pattern and reason for a block to be added.
#[derive(Debug, Clone, Default)]
pub struct NewBlock {
    pub kind_name: String,
    pub owner_name: String,
    pub target_type: String,
    pub target_value: String,
    pub reason: String,
}

/// Persist a new active block.
///
/// # Returns
///
/// * `Ok(Block)` - The stored block
/// * `Err(TollgateError::InvalidInput)` - The reason is empty
pub fn add_block(ctx: &StoreContext, new: NewBlock) -> Result<Block> {
    add_block_with_id(ctx, Uuid::now_v7(), new)
}

/// Persist a new active block under a caller-chosen id.
///
/// Lets callers record the addition as an event on `event-block:<id>`
/// before the block exists. The record is created exclusively, so of two
/// callers racing on one id only the first succeeds.
pub fn add_block_with_id(ctx: &StoreContext, id: Uuid, new: NewBlock) -> Result<Block> {
    if new.reason.trim().is_empty() {
        return Err(TollgateError::InvalidInput(
            "block reason is mandatory".to_string(),
        ));
    }

    let block = Block {
        id,
        kind_name: new.kind_name,
        owner_name: new.owner_name,
        target_type: new.target_type,
        target_value: new.target_value,
        reason: new.reason,
        start_time: Utc::now(),
        end_time: None,
    };

    let json = serde_json::to_vec_pretty(&block)
        .map_err(|e| TollgateError::Store(format!("failed to serialize block: {}", e)))?;
    if atomic_create(ctx.block_path(&block.id), &json)? == CreateOutcome::AlreadyExists {
        return Err(TollgateError::InvalidInput(format!(
            "block {} already exists",
            block.id
        )));
    }

    tracing::info!(block_id = %block.id, reason = %block.reason, "block added");
    journal::record(
        ctx,
        JournalEntry::new(JournalAction::BlockAdd, instance_string()).with_details(
            serde_json::json!({
                "block_id": block.id,
                "kind_name": block.kind_name,
                "owner_name": block.owner_name,
                "target_type": block.target_type,
                "target_value": block.target_value,
                "reason": block.reason,
            }),
        ),
    );

    Ok(block)
}

/// Deactivate the active block `id`, keeping its record.
///
/// # Returns
///
/// * `Ok(Block)` - The block, now with its end time set
/// * `Err(TollgateError::ActiveBlockNotFound)` - No such block, or it already ended
/// * `Err(TollgateError::Locked)` - Another process is removing the same block
pub fn remove_block(ctx: &StoreContext, id: &Uuid) -> Result<Block> {
    let guard = acquire_guard(ctx, &format!("block-{}", id), "block_remove")?;

    let not_found = || TollgateError::ActiveBlockNotFound(id.to_string());
    let path = ctx.block_path(id);
    if !path.exists() {
        return Err(not_found());
    }
    let mut block = read_block(&path)?;
    if !block.active() {
        return Err(not_found());
    }

    block.end_time = Some(Utc::now().max(block.start_time));
    atomic_write_json(&path, &block)?;
    guard.release()?;

    tracing::info!(block_id = %block.id, "block removed");
    journal::record(
        ctx,
        JournalEntry::new(JournalAction::BlockRemove, instance_string())
            .with_details(serde_json::json!({ "block_id": block.id })),
    );

    Ok(block)
}

/// List blocks, newest first, optionally only active (`Some(true)`) or
/// inactive (`Some(false)`) ones. Unreadable records are skipped.
pub fn list_blocks(ctx: &StoreContext, active: Option<bool>) -> Result<Vec<Block>> {
    let mut blocks = scan_blocks(ctx, false)?;
    blocks.retain(|block| active.is_none_or(|want| block.active() == want));
    blocks.sort_by(|a, b| b.start_time.cmp(&a.start_time).then(b.id.cmp(&a.id)));
    Ok(blocks)
}

/// Fail with `Blocked` if any active block matches the operation.
///
/// An unreadable block record fails the check with `Store`, since it may be
/// the block that applies.
pub fn check_blocked(ctx: &StoreContext, kind: &str, owner: &str, target: &Target) -> Result<()> {
    let blocks = scan_blocks(ctx, true)?;
    match blocks
        .iter()
        .find(|b| b.active() && b.matches(kind, owner, target))
    {
        Some(block) => Err(TollgateError::Blocked(block.to_string())),
        None => Ok(()),
    }
}

fn scan_blocks(ctx: &StoreContext, strict: bool) -> Result<Vec<Block>> {
    let mut blocks = Vec::new();

    if !ctx.blocks_dir.exists() {
        return Ok(blocks);
    }

    let entries = fs::read_dir(&ctx.blocks_dir).map_err(|e| {
        TollgateError::Store(format!(
            "failed to read blocks directory '{}': {}",
            ctx.blocks_dir.display(),
            e
        ))
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| {
            TollgateError::Store(format!("failed to read blocks directory entry: {}", e))
        })?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }

        match read_block(&path) {
            Ok(block) => blocks.push(block),
            Err(e) if strict => return Err(e),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable block");
            }
        }
    }

    Ok(blocks)
}

fn read_block(path: &std::path::Path) -> Result<Block> {
    let content = fs::read_to_string(path).map_err(|e| {
        TollgateError::Store(format!("failed to read block '{}': {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        TollgateError::Store(format!("failed to parse block '{}': {}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::temp_store;

    fn kill_deploys() -> NewBlock {
        NewBlock {
            kind_name: "app.deploy".to_string(),
            reason: "release freeze".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn empty_block_matches_everything() {
        let (_temp_dir, ctx) = temp_store();
        let block = add_block(
            &ctx,
            NewBlock {
                reason: "maintenance".to_string(),
                ..Default::default()
            },
        )
        .unwrap();

        assert!(block.matches("app.deploy", "alice", &Target::new("app", "foo")));
        assert!(block.matches("pool.update", "scheduler", &Target::new("pool", "p1")));
        assert!(block.matches("", "", &Target::new("x", "")));
    }

    #[test]
    fn every_non_empty_field_must_match() {
        let block = Block {
            id: Uuid::now_v7(),
            kind_name: "app.deploy".to_string(),
            owner_name: String::new(),
            target_type: "app".to_string(),
            target_value: "foo".to_string(),
            reason: "r".to_string(),
            start_time: Utc::now(),
            end_time: None,
        };

        assert!(block.matches("app.deploy", "anyone", &Target::new("app", "foo")));
        assert!(!block.matches("app.deploy", "anyone", &Target::new("app", "bar")));
        assert!(!block.matches("app.restart", "anyone", &Target::new("app", "foo")));
    }

    #[test]
    fn add_block_requires_reason() {
        let (_temp_dir, ctx) = temp_store();
        let err = add_block(&ctx, NewBlock::default()).unwrap_err();
        assert!(matches!(err, TollgateError::InvalidInput(_)));
        assert!(list_blocks(&ctx, None).unwrap().is_empty());
    }

    #[test]
    fn check_blocked_reports_matching_block() {
        let (_temp_dir, ctx) = temp_store();
        let block = add_block(&ctx, kill_deploys()).unwrap();
        let target = Target::new("app", "foo");

        let err = check_blocked(&ctx, "app.deploy", "alice", &target).unwrap_err();
        assert!(matches!(err, TollgateError::Blocked(_)));
        assert!(err.to_string().contains(&block.id.to_string()));
        assert!(err.to_string().contains("release freeze"));

        check_blocked(&ctx, "app.restart", "alice", &target).unwrap();
    }

    #[test]
    fn remove_block_keeps_history() {
        let (_temp_dir, ctx) = temp_store();
        let block = add_block(&ctx, kill_deploys()).unwrap();

        let removed = remove_block(&ctx, &block.id).unwrap();
        assert!(!removed.active());
        assert!(removed.end_time.unwrap() >= removed.start_time);

        check_blocked(&ctx, "app.deploy", "alice", &Target::new("app", "foo")).unwrap();

        assert!(list_blocks(&ctx, Some(true)).unwrap().is_empty());
        let inactive = list_blocks(&ctx, Some(false)).unwrap();
        assert_eq!(inactive.len(), 1);
        assert_eq!(inactive[0].id, block.id);
    }

    #[test]
    fn remove_block_twice_is_not_found() {
        let (_temp_dir, ctx) = temp_store();
        let block = add_block(&ctx, kill_deploys()).unwrap();
        remove_block(&ctx, &block.id).unwrap();

        let err = remove_block(&ctx, &block.id).unwrap_err();
        assert!(matches!(err, TollgateError::ActiveBlockNotFound(_)));

        let err = remove_block(&ctx, &Uuid::now_v7()).unwrap_err();
        assert!(matches!(err, TollgateError::ActiveBlockNotFound(_)));
    }

    #[test]
    fn remove_block_releases_guard_on_miss() {
        let (_temp_dir, ctx) = temp_store();
        let id = Uuid::now_v7();
        let _ = remove_block(&ctx, &id);
        assert!(!ctx.guard_path(&format!("block-{}", id)).exists());
    }

    #[test]
    fn add_block_with_id_rejects_duplicates() {
        let (_temp_dir, ctx) = temp_store();
        let id = Uuid::now_v7();
        add_block_with_id(&ctx, id, kill_deploys()).unwrap();

        let err = add_block_with_id(&ctx, id, kill_deploys()).unwrap_err();
        assert!(matches!(err, TollgateError::InvalidInput(_)));
    }

    #[test]
    fn racing_adds_with_one_id_store_one_block() {
        let (_temp_dir, ctx) = temp_store();
        let id = Uuid::now_v7();
        let barrier = std::sync::Arc::new(std::sync::Barrier::new(8));

        let results: Vec<Result<Block>> = (0..8)
            .map(|_| {
                let ctx = ctx.clone();
                let barrier = std::sync::Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    add_block_with_id(&ctx, id, kill_deploys())
                })
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(list_blocks(&ctx, None).unwrap().len(), 1);
    }

    #[test]
    fn unreadable_block_fails_admission_check() {
        let (_temp_dir, ctx) = temp_store();
        fs::write(ctx.block_path(&Uuid::now_v7()), b"{ not json").unwrap();
        let target = Target::new("app", "foo");

        let err = check_blocked(&ctx, "app.deploy", "alice", &target).unwrap_err();
        assert!(matches!(err, TollgateError::Store(_)));

        // Listing stays available to operators.
        assert!(list_blocks(&ctx, None).unwrap().is_empty());
    }

    #[test]
    fn list_blocks_newest_first() {
        let (_temp_dir, ctx) = temp_store();
        let first = add_block(&ctx, kill_deploys()).unwrap();
        let second = add_block(&ctx, kill_deploys()).unwrap();

        let blocks = list_blocks(&ctx, None).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].id, second.id);
        assert_eq!(blocks[1].id, first.id);
    }
}
