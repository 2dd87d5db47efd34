//! Core record types: targets, kinds, owners, events and cancel requests.

use crate::error::{Result, TollgateError};
use crate::permission::Allowed;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use uuid::Uuid;

static TARGET_TYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9._-]*$").expect("Invalid target type regex"));

/// The resource an operation acts upon; the unit of mutual exclusion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Target {
    #[serde(rename = "type")]
    pub target_type: String,
    pub value: String,
}

impl Target {
    pub fn new(target_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            target_type: target_type.into(),
            value: value.into(),
        }
    }

    /// Validate the target for use as a lock key.
    pub fn validate(&self) -> Result<()> {
        if !TARGET_TYPE_RE.is_match(&self.target_type) {
            return Err(TollgateError::InvalidInput(format!(
                "target type '{}' must match {}",
                self.target_type,
                TARGET_TYPE_RE.as_str()
            )));
        }
        Ok(())
    }

    /// Filesystem-safe, injective encoding of the target.
    ///
    /// Every byte outside `[A-Za-z0-9._]` is percent-encoded, so the `--`
    /// separator can never appear inside an encoded component. Keys longer
    /// than [`LOCK_KEY_MAX`] keep a readable prefix followed by `~` and a
    /// digest of the full key; `~` is always encoded, so digested keys never
    /// collide with plain ones.
    pub fn lock_key(&self) -> String {
        let key = format!(
            "{}--{}",
            percent_encode(&self.target_type),
            percent_encode(&self.value)
        );
        if key.len() <= LOCK_KEY_MAX {
            return key;
        }
        let digest = Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes());
        format!("{}~{}", &key[..LOCK_KEY_PREFIX], digest.simple())
    }
}

/// Longest lock key used verbatim as a file name stem.
pub const LOCK_KEY_MAX: usize = 180;

const LOCK_KEY_PREFIX: usize = LOCK_KEY_MAX - 40;

fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        if b.is_ascii_alphanumeric() || b == b'.' || b == b'_' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.target_type, self.value)
    }
}

impl FromStr for Target {
    type Err = TollgateError;

    /// Parse `type:value`; the value may itself contain colons.
    fn from_str(s: &str) -> Result<Self> {
        let (target_type, value) = s.split_once(':').ok_or_else(|| {
            TollgateError::InvalidInput(format!("target '{}' must have the form type:value", s))
        })?;
        let target = Target::new(target_type, value);
        target.validate()?;
        Ok(target)
    }
}

/// Whether a kind names a permission or an internal operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KindType {
    Permission,
    Internal,
}

/// The symbolic name of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Kind {
    #[serde(rename = "type")]
    pub kind_type: KindType,
    pub name: String,
}

impl Kind {
    pub fn permission(name: impl Into<String>) -> Self {
        Self {
            kind_type: KindType::Permission,
            name: name.into(),
        }
    }

    pub fn internal(name: impl Into<String>) -> Self {
        Self {
            kind_type: KindType::Internal,
            name: name.into(),
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Who initiated an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerType {
    User,
    Token,
    App,
    Internal,
}

impl FromStr for OwnerType {
    type Err = TollgateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "user" => Ok(Self::User),
            "token" => Ok(Self::Token),
            "app" => Ok(Self::App),
            "internal" => Ok(Self::Internal),
            other => Err(TollgateError::InvalidInput(format!(
                "unknown owner type '{}' (expected user, token, app or internal)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Owner {
    #[serde(rename = "type")]
    pub owner_type: OwnerType,
    pub name: String,
}

impl Owner {
    pub fn user(name: impl Into<String>) -> Self {
        Self {
            owner_type: OwnerType::User,
            name: name.into(),
        }
    }

    pub fn internal(name: impl Into<String>) -> Self {
        Self {
            owner_type: OwnerType::Internal,
            name: name.into(),
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A recorded cancellation request.
///
/// Stored in its own marker file next to the event record and merged into the
/// event whenever it is read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelInfo {
    pub requested: bool,
    pub reason: String,
    pub requested_by: String,
    pub requested_at: DateTime<Utc>,
    #[serde(default)]
    pub acknowledged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
}

/// One attempted or completed guarded operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub target: Target,
    pub kind: Kind,
    pub owner: Owner,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub start_custom_data: Value,
    #[serde(default)]
    pub end_custom_data: Value,
    pub allowed: Allowed,
    pub allowed_cancel: Allowed,
    #[serde(default)]
    pub cancelable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_addr: Option<String>,

    /// `user@host` of the process that opened the event.
    #[serde(default)]
    pub instance: String,

    /// Populated on read from the cancel marker; never part of the record file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_info: Option<CancelInfo>,
}

impl Event {
    /// An event is running until it has been closed.
    pub fn running(&self) -> bool {
        self.end_time.is_none()
    }

    pub fn failed(&self) -> bool {
        self.error.is_some()
    }

    pub fn cancel_pending(&self) -> bool {
        self.cancel_info.as_ref().is_some_and(|c| c.requested)
    }

    /// Wall-clock duration, up to now for running events.
    pub fn duration(&self) -> chrono::Duration {
        self.end_time
            .unwrap_or_else(Utc::now)
            .signed_duration_since(self.start_time)
    }
}

/// Parse an event or block identity.
pub fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| TollgateError::InvalidInput(format!("'{}' is not a valid id", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_parses_type_and_value() {
        let target: Target = "app:foo".parse().unwrap();
        assert_eq!(target.target_type, "app");
        assert_eq!(target.value, "foo");
        assert_eq!(target.to_string(), "app:foo");
    }

    #[test]
    fn target_value_may_contain_colons() {
        let target: Target = "node:10.0.0.1:2375".parse().unwrap();
        assert_eq!(target.target_type, "node");
        assert_eq!(target.value, "10.0.0.1:2375");
    }

    #[test]
    fn target_without_separator_is_invalid() {
        let err = "appfoo".parse::<Target>().unwrap_err();
        assert!(matches!(err, TollgateError::InvalidInput(_)));
    }

    #[test]
    fn target_type_must_be_lowercase_identifier() {
        assert!(Target::new("App", "x").validate().is_err());
        assert!(Target::new("", "x").validate().is_err());
        assert!(Target::new("event-block", "").validate().is_ok());
    }

    #[test]
    fn lock_key_is_filesystem_safe() {
        let key = Target::new("app", "my/app name").lock_key();
        assert_eq!(key, "app--my%2Fapp%20name");
        assert!(!key.contains('/'));
    }

    #[test]
    fn lock_key_is_injective_across_separator() {
        let a = Target::new("a-b", "c").lock_key();
        let b = Target::new("a", "b-c").lock_key();
        assert_ne!(a, b);
    }

    #[test]
    fn long_lock_key_is_bounded_and_distinct() {
        let long = Target::new("app", "x".repeat(300)).lock_key();
        let longer = Target::new("app", "x".repeat(301)).lock_key();
        assert!(long.len() <= LOCK_KEY_MAX);
        assert!(long.starts_with("app--xxxx"));
        assert!(long.contains('~'));
        assert_ne!(long, longer);

        let wide = Target::new("app", "é".repeat(60)).lock_key();
        assert!(wide.len() <= LOCK_KEY_MAX);
        assert!(wide.is_ascii());
    }

    #[test]
    fn short_lock_key_is_not_digested() {
        let key = Target::new("app", "y".repeat(150)).lock_key();
        assert!(!key.contains('~'));
        assert_eq!(key.len(), 5 + 150);
    }

    #[test]
    fn owner_type_parses_known_names() {
        assert_eq!("user".parse::<OwnerType>().unwrap(), OwnerType::User);
        assert_eq!("internal".parse::<OwnerType>().unwrap(), OwnerType::Internal);
        assert!("robot".parse::<OwnerType>().is_err());
    }

    #[test]
    fn parse_id_rejects_garbage() {
        assert!(parse_id("not-a-uuid").is_err());
        let id = Uuid::now_v7();
        assert_eq!(parse_id(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn kind_serializes_with_type_field() {
        let json = serde_json::to_value(Kind::permission("app.deploy")).unwrap();
        assert_eq!(json["type"], "permission");
        assert_eq!(json["name"], "app.deploy");
    }
}
