//! Lock/admission engine.
//!
//! [`open`] decides, without waiting, whether an operation may start on its
//! target. The decision is the exclusive creation of the target's lock file,
//! so of any number of concurrent callers in any number of processes exactly
//! one is admitted and the rest fail with `Locked`.
//!
//! The admitted caller receives an [`EventHandle`]. Closing the handle
//! finalizes the audit record and releases the target; dropping it without
//! closing (early return, panic) closes it with an error instead, so the lock
//! is released on every exit path short of the process dying.

use crate::audit::{read_record, write_record};
use crate::blocks::check_blocked;
use crate::cancel;
use crate::config::Config;
use crate::context::StoreContext;
use crate::error::{Result, TollgateError};
use crate::journal::{self, JournalAction, JournalEntry};
use crate::locks::{LockInfo, acquire_target_lock, clear_lock, instance_string, release_target_lock};
use crate::model::{CancelInfo, Event, Kind, Owner, Target};
use crate::permission::Allowed;
use chrono::Utc;
use serde_json::Value;
use std::fmt::Display;
use uuid::Uuid;

const ABORTED: &str = "operation aborted before the event was closed";
const PANICKED: &str = "operation panicked before the event was closed";
const OPERATOR_CLEARED: &str = "lock cleared by operator";

/// Prefix of the error recorded on events closed after a cancellation request.
pub const CANCELED_PREFIX: &str = "canceled by user request";

/// Everything needed to open an event.
#[derive(Debug, Clone)]
pub struct Opts {
    pub target: Target,
    pub kind: Kind,
    pub owner: Owner,
    pub allowed: Allowed,
    pub allowed_cancel: Allowed,
    pub custom_data: Value,
    pub remote_addr: Option<String>,
    pub cancelable: bool,

    /// Whether active blocks are consulted before locking.
    pub check_blocks: bool,
}

impl Opts {
    pub fn new(
        target: Target,
        kind: Kind,
        owner: Owner,
        allowed: Allowed,
        allowed_cancel: Allowed,
    ) -> Self {
        Self {
            target,
            kind,
            owner,
            allowed,
            allowed_cancel,
            custom_data: Value::Null,
            remote_addr: None,
            cancelable: true,
            check_blocks: true,
        }
    }

    pub fn with_custom_data(mut self, data: Value) -> Self {
        self.custom_data = data;
        self
    }

    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    pub fn not_cancelable(mut self) -> Self {
        self.cancelable = false;
        self
    }

    /// Skip the block check. Reserved for block administration, so that a
    /// block matching everything can still be lifted.
    pub fn exempt_from_blocks(mut self) -> Self {
        self.check_blocks = false;
        self
    }

    fn validate(&self) -> Result<()> {
        self.target.validate()?;
        if self.target.value.is_empty() {
            return Err(TollgateError::InvalidInput(
                "target value must not be empty".to_string(),
            ));
        }
        if self.kind.name.trim().is_empty() {
            return Err(TollgateError::InvalidInput(
                "kind name must not be empty".to_string(),
            ));
        }
        if self.owner.name.trim().is_empty() {
            return Err(TollgateError::InvalidInput(
                "owner name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Open an event: check blocks, take the target lock, persist the record.
///
/// # Returns
///
/// * `Ok(EventHandle)` - The caller now holds the target
/// * `Err(TollgateError::Blocked)` - An active block matches; no lock was touched
/// * `Err(TollgateError::Locked)` - Another event is running on the target
/// * `Err(TollgateError::InvalidInput)` - Malformed target, kind or owner
pub fn open(ctx: &StoreContext, opts: Opts) -> Result<EventHandle> {
    opts.validate()?;
    if opts.check_blocks {
        check_blocked(ctx, &opts.kind.name, &opts.owner.name, &opts.target)?;
    }

    let event = Event {
        id: Uuid::now_v7(),
        target: opts.target,
        kind: opts.kind,
        owner: opts.owner,
        start_time: Utc::now(),
        end_time: None,
        error: None,
        start_custom_data: opts.custom_data,
        end_custom_data: Value::Null,
        allowed: opts.allowed,
        allowed_cancel: opts.allowed_cancel,
        cancelable: opts.cancelable,
        remote_addr: opts.remote_addr,
        instance: instance_string(),
        cancel_info: None,
    };

    acquire_target_lock(ctx, &event)?;

    if let Err(e) = write_record(ctx, &event) {
        if let Err(release_err) = release_target_lock(ctx, &event.target, &event.id) {
            tracing::warn!(
                event_id = %event.id,
                error = %release_err,
                "failed to release lock after record write failure"
            );
        }
        return Err(e);
    }

    tracing::info!(
        event_id = %event.id,
        target_name = %event.target,
        kind = %event.kind,
        owner = %event.owner,
        "event opened"
    );
    journal::record(
        ctx,
        JournalEntry::new(JournalAction::Open, event.owner.name.clone())
            .with_event(event.id)
            .with_target(&event.target)
            .with_details(serde_json::json!({ "kind": event.kind.name })),
    );

    Ok(EventHandle {
        ctx: ctx.clone(),
        event,
        closed: false,
    })
}

/// Finalize the record of `id` and release its target lock.
///
/// The record is rewritten before the lock is removed. The lock is only
/// removed if it still names this event.
///
/// # Returns
///
/// * `Ok(Event)` - The closed record
/// * `Err(TollgateError::NotFound)` - No such event
/// * `Err(TollgateError::InvalidInput)` - The event was already closed
pub fn close_event(
    ctx: &StoreContext,
    id: &Uuid,
    error: Option<String>,
    end_custom_data: Value,
) -> Result<Event> {
    let mut event = read_record(ctx, id)?;
    if !event.running() {
        return Err(TollgateError::InvalidInput(format!(
            "event {} already closed",
            id
        )));
    }

    event.end_time = Some(Utc::now().max(event.start_time));
    event.error = error;
    event.end_custom_data = end_custom_data;
    write_record(ctx, &event)?;

    release_target_lock(ctx, &event.target, &event.id)?;

    tracing::info!(
        event_id = %event.id,
        target_name = %event.target,
        kind = %event.kind,
        error = event.error.as_deref().unwrap_or(""),
        "event closed"
    );
    journal::record(
        ctx,
        JournalEntry::new(JournalAction::Close, event.owner.name.clone())
            .with_event(event.id)
            .with_target(&event.target)
            .with_details(serde_json::json!({
                "kind": event.kind.name,
                "error": event.error,
                "duration_ms": event.duration().num_milliseconds(),
            })),
    );

    Ok(event)
}

/// Operator reconciliation of a leaked lock.
///
/// Removes the lock on `target` regardless of its holder and, if the holder's
/// record is still running, closes it with `lock cleared by operator`. A torn
/// lock names no holder, so only the lock file is removed.
pub fn force_release(
    ctx: &StoreContext,
    target: &Target,
    config: &Config,
    actor: &str,
) -> Result<LockInfo> {
    let info = clear_lock(ctx, target, config)?;
    let holder = info.metadata.as_ref().map(|meta| meta.event_id);

    let finalized = match holder {
        Some(holder) => match read_record(ctx, &holder) {
            Ok(event) if event.running() => {
                close_event(ctx, &holder, Some(OPERATOR_CLEARED.to_string()), Value::Null)?;
                true
            }
            Ok(_) | Err(TollgateError::NotFound(_)) => false,
            Err(e) => return Err(e),
        },
        None => false,
    };

    tracing::warn!(
        target_name = %target,
        holder = ?holder,
        actor,
        torn = info.metadata.is_none(),
        "lock cleared by operator"
    );

    let mut entry = JournalEntry::new(JournalAction::LockClear, actor).with_target(target);
    if let Some(holder) = holder {
        entry = entry.with_event(holder);
    }
    let details = match &info.metadata {
        Some(meta) => serde_json::json!({
            "holder_owner": meta.owner,
            "holder_instance": meta.instance,
            "age": meta.age_string(),
            "stale": info.is_stale,
            "event_finalized": finalized,
        }),
        None => serde_json::json!({
            "torn": true,
            "stale": info.is_stale,
            "event_finalized": false,
        }),
    };
    journal::record(ctx, entry.with_details(details));

    Ok(info)
}

/// A running event owned by the current caller.
///
/// Holding the handle means holding the target. It must be finished with
/// [`close`](Self::close), [`finish`](Self::finish) or
/// [`close_canceled`](Self::close_canceled); otherwise it is closed with an
/// error when dropped.
#[derive(Debug)]
pub struct EventHandle {
    ctx: StoreContext,
    event: Event,
    closed: bool,
}

impl EventHandle {
    pub fn id(&self) -> Uuid {
        self.event.id
    }

    pub fn target(&self) -> &Target {
        &self.event.target
    }

    /// The record as it was opened.
    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Close the event; `error` is `None` for success.
    ///
    /// If the store fails while closing, the drop path tries once more.
    pub fn close(mut self, error: Option<String>, end_custom_data: Value) -> Result<Event> {
        self.try_close(error, end_custom_data)
    }

    fn try_close(&mut self, error: Option<String>, end_custom_data: Value) -> Result<Event> {
        let result = close_event(&self.ctx, &self.event.id, error, end_custom_data);
        if !matches!(result, Err(TollgateError::Store(_))) {
            self.closed = true;
        }
        result
    }

    /// Close the event with the outcome of the guarded work.
    pub fn finish<T, E: Display>(
        self,
        outcome: &std::result::Result<T, E>,
        end_custom_data: Value,
    ) -> Result<Event> {
        let error = outcome.as_ref().err().map(|e| e.to_string());
        self.close(error, end_custom_data)
    }

    /// Close the event as canceled, recording the requester's reason.
    pub fn close_canceled(self, end_custom_data: Value) -> Result<Event> {
        let error = match cancel::load_cancel_info(&self.ctx, &self.event.id)? {
            Some(info) => format!(
                "{}: {} (requested by {})",
                CANCELED_PREFIX, info.reason, info.requested_by
            ),
            None => CANCELED_PREFIX.to_string(),
        };
        self.close(Some(error), end_custom_data)
    }

    /// Poll the store once for a pending cancellation request.
    pub fn cancel_requested(&self) -> Result<Option<CancelInfo>> {
        cancel::check_cancel(&self.ctx, &self.event.id)
    }

    pub fn acknowledge_cancel(&self) -> Result<CancelInfo> {
        cancel::acknowledge_cancel(&self.ctx, &self.event.id)
    }
}

impl Drop for EventHandle {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let reason = if std::thread::panicking() {
            PANICKED
        } else {
            ABORTED
        };
        tracing::warn!(event_id = %self.event.id, reason, "closing event from drop");
        if let Err(e) = close_event(
            &self.ctx,
            &self.event.id,
            Some(reason.to_string()),
            Value::Null,
        ) {
            tracing::warn!(event_id = %self.event.id, error = %e, "failed to close dropped event");
        }
    }
}
