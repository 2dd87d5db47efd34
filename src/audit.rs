//! Audit and query engine: retrieval of historical and running events.
//!
//! Records are never deleted, so every event ever opened stays queryable.
//! Readers merge the cancel marker into each record; writers only ever
//! persist the bare record.

use crate::cancel::load_cancel_info;
use crate::context::StoreContext;
use crate::error::{Result, TollgateError};
use crate::filter::Filter;
use crate::fs::atomic_write_json;
use crate::model::{Event, Kind};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use uuid::Uuid;

/// List events matching `filter`, newest first, then apply skip/limit.
///
/// An empty result is not an error.
pub fn list(ctx: &StoreContext, filter: &Filter) -> Result<Vec<Event>> {
    filter.validate()?;

    let mut events: Vec<Event> = scan_events(ctx)?
        .into_iter()
        .filter(|event| filter.matches(event))
        .collect();

    events.sort_by(|a, b| b.start_time.cmp(&a.start_time).then(b.id.cmp(&a.id)));

    let events = events
        .into_iter()
        .skip(filter.skip)
        .take(filter.limit.unwrap_or(usize::MAX))
        .collect();
    Ok(events)
}

/// Fetch one event with its cancellation state.
pub fn get_by_id(ctx: &StoreContext, id: &Uuid) -> Result<Event> {
    let mut event = read_record(ctx, id)?;
    event.cancel_info = load_cancel_info(ctx, id)?;
    Ok(event)
}

/// Every distinct kind ever recorded, sorted.
pub fn get_kinds(ctx: &StoreContext) -> Result<Vec<Kind>> {
    let kinds: BTreeSet<Kind> = scan_records(ctx)?.into_iter().map(|e| e.kind).collect();
    Ok(kinds.into_iter().collect())
}

/// Read the stored record without merging the cancel marker.
pub(crate) fn read_record(ctx: &StoreContext, id: &Uuid) -> Result<Event> {
    let path = ctx.event_path(id);
    if !path.exists() {
        return Err(TollgateError::NotFound(format!("event {}", id)));
    }
    read_event_file(&path)
}

/// Atomically persist the bare record of `event`.
pub(crate) fn write_record(ctx: &StoreContext, event: &Event) -> Result<()> {
    let path = ctx.event_path(&event.id);
    if event.cancel_info.is_some() {
        let bare = Event {
            cancel_info: None,
            ..event.clone()
        };
        return atomic_write_json(path, &bare);
    }
    atomic_write_json(path, event)
}

fn read_event_file(path: &Path) -> Result<Event> {
    let content = fs::read_to_string(path).map_err(|e| {
        TollgateError::Store(format!("failed to read event '{}': {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        TollgateError::Store(format!("failed to parse event '{}': {}", path.display(), e))
    })
}

/// All readable records, without cancel state.
fn scan_records(ctx: &StoreContext) -> Result<Vec<Event>> {
    let mut events = Vec::new();

    if !ctx.events_dir.exists() {
        return Ok(events);
    }

    let entries = fs::read_dir(&ctx.events_dir).map_err(|e| {
        TollgateError::Store(format!(
            "failed to read events directory '{}': {}",
            ctx.events_dir.display(),
            e
        ))
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| {
            TollgateError::Store(format!("failed to read events directory entry: {}", e))
        })?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }

        match read_event_file(&path) {
            Ok(event) => events.push(event),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable event");
            }
        }
    }

    Ok(events)
}

fn scan_events(ctx: &StoreContext) -> Result<Vec<Event>> {
    let mut events = scan_records(ctx)?;
    for event in &mut events {
        match load_cancel_info(ctx, &event.id) {
            Ok(info) => event.cancel_info = info,
            Err(e) => {
                tracing::warn!(event_id = %event.id, error = %e, "ignoring unreadable cancel marker");
            }
        }
    }
    Ok(events)
}
