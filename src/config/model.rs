//! Config struct definition and default implementation.

use super::types::*;
use crate::permission::Permission;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration for a tollgate store.
///
/// This struct represents the contents of `<store>/config.yaml`.
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Lock settings
    // =========================================================================
    /// Minutes after which `lock list` flags a lock as stale.
    ///
    /// Purely informational: locks never expire on their own.
    #[serde(default = "default_lock_stale_minutes")]
    pub lock_stale_minutes: u32,

    // =========================================================================
    // Cancellation settings
    // =========================================================================
    /// How often a guarded worker re-reads its cancel marker.
    #[serde(default = "default_cancel_poll_interval_ms")]
    pub cancel_poll_interval_ms: u64,

    // =========================================================================
    // Redaction settings
    // =========================================================================
    /// Redact private environment values from deploy payloads on read.
    #[serde(default)]
    pub suppress_sensitive_envs: bool,

    /// Event kinds whose start payload holds deploy options.
    #[serde(default = "default_deploy_kinds")]
    pub deploy_kinds: Vec<String>,

    /// Environment variable names that are always redacted (glob patterns).
    #[serde(default)]
    pub sensitive_env_globs: Vec<String>,

    // =========================================================================
    // Authorization settings
    // =========================================================================
    /// Grants for callers without an entry in `grants`.
    #[serde(default = "default_grants")]
    pub default_grants: Vec<Permission>,

    /// Grants per caller name.
    #[serde(default)]
    pub grants: BTreeMap<String, Vec<Permission>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lock_stale_minutes: default_lock_stale_minutes(),
            cancel_poll_interval_ms: default_cancel_poll_interval_ms(),
            suppress_sensitive_envs: false,
            deploy_kinds: default_deploy_kinds(),
            sensitive_env_globs: Vec::new(),
            default_grants: default_grants(),
            grants: BTreeMap::new(),
        }
    }
}
