//! Query descriptor for the audit engine.

use crate::error::{Result, TollgateError};
use crate::model::{Event, OwnerType};
use crate::permission::Permissions;
use chrono::{DateTime, Utc};

/// Conjunctive event predicates plus paging and the caller's permission
/// projection. Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub target_type: Option<String>,
    pub target_value: Option<String>,

    /// Matches if the event kind is any of these.
    pub kind_names: Vec<String>,

    pub owner_type: Option<OwnerType>,
    pub owner_name: Option<String>,

    /// Inclusive bounds on start time.
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,

    pub running: Option<bool>,
    pub error_only: bool,

    pub skip: usize,
    pub limit: Option<usize>,

    /// Grants of the caller. `None` means unscoped and is reserved for
    /// internal callers.
    pub permissions: Option<Permissions>,
}

impl Filter {
    pub fn validate(&self) -> Result<()> {
        if let (Some(since), Some(until)) = (self.since, self.until)
            && since > until
        {
            return Err(TollgateError::InvalidInput(format!(
                "since ({}) is after until ({})",
                since.to_rfc3339(),
                until.to_rfc3339()
            )));
        }
        Ok(())
    }

    /// Drop fields a user must never set on their own filter.
    pub fn prune_user_values(&mut self) {
        self.permissions = None;
    }

    pub fn matches(&self, event: &Event) -> bool {
        if let Some(t) = &self.target_type
            && *t != event.target.target_type
        {
            return false;
        }
        if let Some(v) = &self.target_value
            && *v != event.target.value
        {
            return false;
        }
        if !self.kind_names.is_empty() && !self.kind_names.contains(&event.kind.name) {
            return false;
        }
        if self.owner_type.is_some_and(|t| t != event.owner.owner_type) {
            return false;
        }
        if let Some(name) = &self.owner_name
            && *name != event.owner.name
        {
            return false;
        }
        if self.since.is_some_and(|since| event.start_time < since) {
            return false;
        }
        if self.until.is_some_and(|until| event.start_time > until) {
            return false;
        }
        if self.running.is_some_and(|r| r != event.running()) {
            return false;
        }
        if self.error_only && !event.failed() {
            return false;
        }
        match &self.permissions {
            Some(perms) => perms.allows(&event.allowed),
            None => true,
        }
    }
}
