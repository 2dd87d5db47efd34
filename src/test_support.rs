use crate::context::StoreContext;
use crate::model::{Event, Kind, Owner, Target};
use crate::permission::{Allowed, PermissionContext};
use chrono::Utc;
use tempfile::TempDir;
use uuid::Uuid;

/// A fresh, initialized store in a temporary directory.
pub(crate) fn temp_store() -> (TempDir, StoreContext) {
    let temp_dir = TempDir::new().unwrap();
    let ctx = StoreContext::at(temp_dir.path().join("store")).unwrap();
    ctx.create_layout().unwrap();
    (temp_dir, ctx)
}

/// A running `app.deploy` event on `target`, not yet persisted.
pub(crate) fn sample_event(target: Target) -> Event {
    Event {
        id: Uuid::now_v7(),
        target,
        kind: Kind::permission("app.deploy"),
        owner: Owner::user("alice@example.com"),
        start_time: Utc::now(),
        end_time: None,
        error: None,
        start_custom_data: serde_json::Value::Null,
        end_custom_data: serde_json::Value::Null,
        allowed: Allowed::new("app.read.events", vec![PermissionContext::global()]),
        allowed_cancel: Allowed::new("app.deploy.cancel", vec![PermissionContext::global()]),
        cancelable: true,
        remote_addr: None,
        instance: crate::locks::instance_string(),
        cancel_info: None,
    }
}
