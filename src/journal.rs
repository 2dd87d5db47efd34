//! Transition journal for tollgate.
//!
//! Every engine transition appends one line to `journal/journal.ndjson` in the
//! store root, so operators can reconstruct what happened across processes
//! and machines without scanning every record.
//!
//! # Entry Format
//!
//! Each entry is a single-line JSON object with the following fields:
//! - `ts`: RFC3339 timestamp
//! - `action`: the transition (open, close, cancel_request, ...)
//! - `actor`: who caused it (owner name, caller, or `user@HOST`)
//! - `event`: optional event id
//! - `target`: optional `type:value` target
//! - `details`: freeform object with action-specific details
//!
//! The journal is secondary to the records themselves: [`record`] logs a
//! warning and carries on when an append fails.

use crate::context::StoreContext;
use crate::error::{Result, TollgateError};
use crate::model::Target;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use uuid::Uuid;

/// Transitions that are journaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalAction {
    /// Store initialized
    Init,
    /// Event opened, target lock granted
    Open,
    /// Event closed, target lock released
    Close,
    /// Cancellation requested for a running event
    CancelRequest,
    /// Worker acknowledged a cancellation request
    CancelAck,
    /// Block added
    BlockAdd,
    /// Block deactivated
    BlockRemove,
    /// Target lock cleared by an operator
    LockClear,
}

impl std::fmt::Display for JournalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JournalAction::Init => write!(f, "init"),
            JournalAction::Open => write!(f, "open"),
            JournalAction::Close => write!(f, "close"),
            JournalAction::CancelRequest => write!(f, "cancel_request"),
            JournalAction::CancelAck => write!(f, "cancel_ack"),
            JournalAction::BlockAdd => write!(f, "block_add"),
            JournalAction::BlockRemove => write!(f, "block_remove"),
            JournalAction::LockClear => write!(f, "lock_clear"),
        }
    }
}

/// One journal line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub ts: DateTime<Utc>,

    pub action: JournalAction,

    pub actor: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<Uuid>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    #[serde(default)]
    pub details: Value,
}

impl JournalEntry {
    /// Create an entry for `action` performed by `actor`, timestamped now.
    pub fn new(action: JournalAction, actor: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            action,
            actor: actor.into(),
            event: None,
            target: None,
            details: Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_event(mut self, id: Uuid) -> Self {
        self.event = Some(id);
        self
    }

    pub fn with_target(mut self, target: &Target) -> Self {
        self.target = Some(target.to_string());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Serialize the entry to a single-line JSON string.
    pub fn to_ndjson_line(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            TollgateError::Store(format!("failed to serialize journal entry: {}", e))
        })
    }
}

/// Append an entry to the journal, creating the file if needed.
///
/// The line is written with a trailing newline and synced to disk.
pub fn append_entry(ctx: &StoreContext, entry: &JournalEntry) -> Result<()> {
    let journal_file = ctx.journal_file();
    let line = entry.to_ndjson_line()?;

    if !ctx.journal_dir.exists() {
        fs::create_dir_all(&ctx.journal_dir).map_err(|e| {
            TollgateError::Store(format!(
                "failed to create journal directory '{}': {}",
                ctx.journal_dir.display(),
                e
            ))
        })?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&journal_file)
        .map_err(|e| {
            TollgateError::Store(format!(
                "failed to open journal '{}': {}",
                journal_file.display(),
                e
            ))
        })?;

    writeln!(file, "{}", line).map_err(|e| {
        TollgateError::Store(format!(
            "failed to write to journal '{}': {}",
            journal_file.display(),
            e
        ))
    })?;

    file.sync_all().map_err(|e| {
        TollgateError::Store(format!(
            "failed to sync journal '{}': {}",
            journal_file.display(),
            e
        ))
    })
}

/// Append an entry, logging instead of failing.
pub fn record(ctx: &StoreContext, entry: JournalEntry) {
    if let Err(e) = append_entry(ctx, &entry) {
        tracing::warn!(action = %entry.action, error = %e, "failed to append journal entry");
    }
}

/// Read the journal, keeping only the last `tail` entries when given.
///
/// Lines that fail to parse are skipped with a warning.
pub fn read_journal(ctx: &StoreContext, tail: Option<usize>) -> Result<Vec<JournalEntry>> {
    let journal_file = ctx.journal_file();
    if !journal_file.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(&journal_file).map_err(|e| {
        TollgateError::Store(format!(
            "failed to read journal '{}': {}",
            journal_file.display(),
            e
        ))
    })?;

    let mut entries: Vec<JournalEntry> = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(n, line)| match serde_json::from_str(line) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(line = n + 1, error = %e, "skipping malformed journal line");
                None
            }
        })
        .collect();

    if let Some(tail) = tail
        && entries.len() > tail
    {
        entries.drain(..entries.len() - tail);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::temp_store;
    use serde_json::json;

    #[test]
    fn test_entry_creation() {
        let entry = JournalEntry::new(JournalAction::Init, "alice@host");

        assert_eq!(entry.action, JournalAction::Init);
        assert_eq!(entry.actor, "alice@host");
        assert!(entry.event.is_none());
        let age = Utc::now().signed_duration_since(entry.ts);
        assert!(age.num_minutes() < 1);
    }

    #[test]
    fn test_entry_serialization_is_single_line() {
        let id = Uuid::now_v7();
        let entry = JournalEntry::new(JournalAction::Open, "alice")
            .with_event(id)
            .with_target(&Target::new("app", "foo"))
            .with_details(json!({"kind": "app.deploy"}));

        let line = entry.to_ndjson_line().unwrap();
        assert!(!line.contains('\n'));

        let parsed: JournalEntry = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed.event, Some(id));
        assert_eq!(parsed.target.as_deref(), Some("app:foo"));
        assert_eq!(parsed.details["kind"], "app.deploy");
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let line = JournalEntry::new(JournalAction::Init, "alice")
            .to_ndjson_line()
            .unwrap();
        let parsed: Value = serde_json::from_str(&line).unwrap();

        assert!(parsed.get("event").is_none());
        assert!(parsed.get("target").is_none());
    }

    #[test]
    fn test_action_names() {
        assert_eq!(JournalAction::CancelRequest.to_string(), "cancel_request");
        assert_eq!(JournalAction::LockClear.to_string(), "lock_clear");
        let line = JournalEntry::new(JournalAction::BlockRemove, "a")
            .to_ndjson_line()
            .unwrap();
        assert!(line.contains("\"block_remove\""));
    }

    #[test]
    fn test_append_and_read_back() {
        let (_temp_dir, ctx) = temp_store();

        append_entry(&ctx, &JournalEntry::new(JournalAction::Init, "a")).unwrap();
        append_entry(&ctx, &JournalEntry::new(JournalAction::Open, "b")).unwrap();

        let content = fs::read_to_string(ctx.journal_file()).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.ends_with('\n'));

        let entries = read_journal(&ctx, None).unwrap();
        assert_eq!(entries[0].action, JournalAction::Init);
        assert_eq!(entries[1].action, JournalAction::Open);
    }

    #[test]
    fn test_read_journal_tail() {
        let (_temp_dir, ctx) = temp_store();
        for actor in ["a", "b", "c"] {
            record(&ctx, JournalEntry::new(JournalAction::Open, actor));
        }

        let entries = read_journal(&ctx, Some(2)).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].actor, "b");
        assert_eq!(entries[1].actor, "c");

        assert_eq!(read_journal(&ctx, Some(10)).unwrap().len(), 3);
    }

    #[test]
    fn test_read_journal_missing_file_is_empty() {
        let (_temp_dir, ctx) = temp_store();
        assert!(read_journal(&ctx, None).unwrap().is_empty());
    }

    #[test]
    fn test_read_journal_skips_malformed_lines() {
        let (_temp_dir, ctx) = temp_store();
        record(&ctx, JournalEntry::new(JournalAction::Init, "a"));
        let mut file = OpenOptions::new()
            .append(true)
            .open(ctx.journal_file())
            .unwrap();
        writeln!(file, "not json").unwrap();
        record(&ctx, JournalEntry::new(JournalAction::Close, "a"));

        let entries = read_journal(&ctx, None).unwrap();
        assert_eq!(entries.len(), 2);
    }
}
