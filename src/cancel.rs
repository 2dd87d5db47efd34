//! Cooperative cancellation.
//!
//! A cancellation request is a marker file, `cancel/<event-id>.json`, created
//! exclusively so a running event can be asked to stop at most once. The
//! worker executing the guarded operation polls for the marker, acknowledges
//! it and closes its event. Nothing is ever terminated by force.

use crate::audit::read_record;
use crate::context::StoreContext;
use crate::error::{Result, TollgateError};
use crate::fs::{CreateOutcome, atomic_write_json, create_exclusive};
use crate::journal::{self, JournalAction, JournalEntry};
use crate::model::CancelInfo;
use chrono::Utc;
use std::fs;
use std::io::ErrorKind;
use uuid::Uuid;

/// Record a cancellation request for a running event.
///
/// The caller is responsible for checking the event's `allowed_cancel`
/// descriptor beforehand.
///
/// # Returns
///
/// * `Ok(CancelInfo)` - The request was recorded
/// * `Err(TollgateError::InvalidInput)` - Empty reason
/// * `Err(TollgateError::NotFound)` - No such event
/// * `Err(TollgateError::NotCancelable)` - Closed, not cancelable, or already requested
pub fn request_cancel(
    ctx: &StoreContext,
    id: &Uuid,
    reason: &str,
    requested_by: &str,
) -> Result<CancelInfo> {
    if reason.trim().is_empty() {
        return Err(TollgateError::InvalidInput("reason is mandatory".to_string()));
    }

    let event = read_record(ctx, id)?;
    if !event.cancelable {
        return Err(TollgateError::NotCancelable(format!(
            "event {} does not accept cancellation",
            id
        )));
    }
    if !event.running() {
        return Err(TollgateError::NotCancelable(format!(
            "event {} is already closed",
            id
        )));
    }

    let info = CancelInfo {
        requested: true,
        reason: reason.to_string(),
        requested_by: requested_by.to_string(),
        requested_at: Utc::now(),
        acknowledged: false,
        acknowledged_at: None,
    };
    let json = serde_json::to_vec_pretty(&info)
        .map_err(|e| TollgateError::Store(format!("failed to serialize cancel request: {}", e)))?;

    let marker = ctx.cancel_path(id);
    if create_exclusive(&marker, &json)? == CreateOutcome::AlreadyExists {
        return Err(TollgateError::NotCancelable(format!(
            "cancellation already requested for event {}",
            id
        )));
    }

    // The event may have closed between the first read and the marker create.
    let closed = match read_record(ctx, id) {
        Ok(event) => !event.running(),
        Err(e) => {
            let _ = fs::remove_file(&marker);
            return Err(e);
        }
    };
    if closed {
        let _ = fs::remove_file(&marker);
        return Err(TollgateError::NotCancelable(format!(
            "event {} is already closed",
            id
        )));
    }

    tracing::info!(event_id = %id, requested_by, reason, "cancellation requested");
    journal::record(
        ctx,
        JournalEntry::new(JournalAction::CancelRequest, requested_by)
            .with_event(*id)
            .with_target(&event.target)
            .with_details(serde_json::json!({ "reason": reason })),
    );

    Ok(info)
}

/// Read the cancellation marker of an event, if one exists.
pub fn load_cancel_info(ctx: &StoreContext, id: &Uuid) -> Result<Option<CancelInfo>> {
    let marker = ctx.cancel_path(id);
    let content = match fs::read_to_string(&marker) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(TollgateError::Store(format!(
                "failed to read cancel marker '{}': {}",
                marker.display(),
                e
            )));
        }
    };

    serde_json::from_str(&content).map(Some).map_err(|e| {
        TollgateError::Store(format!(
            "failed to parse cancel marker '{}': {}",
            marker.display(),
            e
        ))
    })
}

/// One poll of the store: the pending request for `id`, if any.
pub fn check_cancel(ctx: &StoreContext, id: &Uuid) -> Result<Option<CancelInfo>> {
    Ok(load_cancel_info(ctx, id)?.filter(|info| info.requested))
}

/// Mark the cancellation request of `id` as seen by its worker.
///
/// Acknowledging twice keeps the first acknowledgement time.
pub fn acknowledge_cancel(ctx: &StoreContext, id: &Uuid) -> Result<CancelInfo> {
    let mut info = check_cancel(ctx, id)?.ok_or_else(|| {
        TollgateError::NotFound(format!("no cancellation requested for event {}", id))
    })?;

    if info.acknowledged {
        return Ok(info);
    }

    info.acknowledged = true;
    info.acknowledged_at = Some(Utc::now());
    atomic_write_json(ctx.cancel_path(id), &info)?;

    tracing::info!(event_id = %id, "cancellation acknowledged");
    journal::record(
        ctx,
        JournalEntry::new(JournalAction::CancelAck, crate::locks::instance_string())
            .with_event(*id),
    );

    Ok(info)
}
