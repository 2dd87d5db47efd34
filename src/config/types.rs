//! Default value functions used by the Config struct.

use crate::permission::Permission;

pub(crate) fn default_lock_stale_minutes() -> u32 {
    120
}

pub(crate) fn default_cancel_poll_interval_ms() -> u64 {
    1000
}

/// Kinds whose start payload carries application deploy options.
pub fn default_deploy_kinds() -> Vec<String> {
    vec!["app.deploy".to_string()]
}

/// A single-operator store grants everything to unknown callers.
pub fn default_grants() -> Vec<Permission> {
    vec![Permission::root()]
}
