//! Authorization boundary.
//!
//! The engine never evaluates permission schemes on its own; it stores
//! [`Allowed`] descriptors on events and asks an [`Authorizer`] (or a
//! caller's [`Permissions`] projection) whether they are satisfied.
//!
//! # Scheme coverage
//!
//! Schemes are dot-separated (`app.read.events`). A grant covers a scheme when
//! its own scheme is empty (root), equal, or a whole-segment prefix:
//! `app` covers `app.deploy` but not `application.deploy`.
//!
//! # Context coverage
//!
//! A grant in the `global` context covers every descriptor. Any other grant
//! context must equal one of the descriptor's contexts.

use crate::error::{Result, TollgateError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Kinds of permission contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContextType {
    Global,
    Team,
    App,
    Pool,
    Cluster,
    Service,
    User,
}

impl ContextType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextType::Global => "global",
            ContextType::Team => "team",
            ContextType::App => "app",
            ContextType::Pool => "pool",
            ContextType::Cluster => "cluster",
            ContextType::Service => "service",
            ContextType::User => "user",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "global" => Some(Self::Global),
            "team" => Some(Self::Team),
            "app" => Some(Self::App),
            "pool" => Some(Self::Pool),
            "cluster" => Some(Self::Cluster),
            "service" => Some(Self::Service),
            "user" => Some(Self::User),
            _ => None,
        }
    }
}

/// A permission context: `global`, or a typed value such as `app:foo`.
///
/// Serialized as its string form so config files stay readable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PermissionContext {
    pub ctx_type: ContextType,
    pub value: String,
}

impl PermissionContext {
    pub fn global() -> Self {
        Self {
            ctx_type: ContextType::Global,
            value: String::new(),
        }
    }

    pub fn new(ctx_type: ContextType, value: impl Into<String>) -> Self {
        if ctx_type == ContextType::Global {
            return Self::global();
        }
        Self {
            ctx_type,
            value: value.into(),
        }
    }

    pub fn is_global(&self) -> bool {
        self.ctx_type == ContextType::Global
    }
}

impl fmt::Display for PermissionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_global() {
            write!(f, "global")
        } else {
            write!(f, "{}:{}", self.ctx_type.as_str(), self.value)
        }
    }
}

impl FromStr for PermissionContext {
    type Err = TollgateError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s == "global" {
            return Ok(Self::global());
        }
        let (ctx_type, value) = s
            .split_once(':')
            .and_then(|(t, v)| ContextType::parse(t).map(|t| (t, v)))
            .ok_or_else(|| {
                TollgateError::InvalidInput(format!(
                    "permission context '{}' must be 'global' or '<type>:<value>'",
                    s
                ))
            })?;
        if value.is_empty() {
            return Err(TollgateError::InvalidInput(format!(
                "permission context '{}' has an empty value",
                s
            )));
        }
        Ok(Self::new(ctx_type, value))
    }
}

impl TryFrom<String> for PermissionContext {
    type Error = TollgateError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<PermissionContext> for String {
    fn from(ctx: PermissionContext) -> Self {
        ctx.to_string()
    }
}

/// Who may see or act on an event: a scheme plus the contexts it applies in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allowed {
    pub scheme: String,
    #[serde(default)]
    pub contexts: Vec<PermissionContext>,
}

impl Allowed {
    pub fn new(scheme: impl Into<String>, contexts: Vec<PermissionContext>) -> Self {
        Self {
            scheme: scheme.into(),
            contexts,
        }
    }
}

/// A single grant held by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    #[serde(default)]
    pub scheme: String,
    pub context: PermissionContext,
}

impl Permission {
    pub fn new(scheme: impl Into<String>, context: PermissionContext) -> Self {
        Self {
            scheme: scheme.into(),
            context,
        }
    }

    /// The root grant: every scheme in every context.
    pub fn root() -> Self {
        Self::new("", PermissionContext::global())
    }

    fn covers_scheme(&self, scheme: &str) -> bool {
        self.scheme.is_empty()
            || self.scheme == scheme
            || scheme
                .strip_prefix(self.scheme.as_str())
                .is_some_and(|rest| rest.starts_with('.'))
    }

    /// Whether this grant satisfies `scheme` in any of `contexts`.
    pub fn covers(&self, scheme: &str, contexts: &[PermissionContext]) -> bool {
        self.covers_scheme(scheme)
            && (self.context.is_global() || contexts.iter().any(|c| *c == self.context))
    }
}

/// A caller's grants; the permission projection carried by a query filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions(pub Vec<Permission>);

impl Permissions {
    pub fn new(grants: Vec<Permission>) -> Self {
        Self(grants)
    }

    pub fn check(&self, scheme: &str, contexts: &[PermissionContext]) -> bool {
        self.0.iter().any(|p| p.covers(scheme, contexts))
    }

    pub fn allows(&self, allowed: &Allowed) -> bool {
        self.check(&allowed.scheme, &allowed.contexts)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Capability check delegated to the platform's authorization service.
pub trait Authorizer {
    fn check(&self, caller: &str, scheme: &str, contexts: &[PermissionContext]) -> bool;

    /// The full grant set of `caller`, used to scope audit queries.
    fn permissions(&self, caller: &str) -> Permissions;
}

/// Static grant table, loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct GrantTable {
    grants: BTreeMap<String, Vec<Permission>>,
    default_grants: Vec<Permission>,
}

impl GrantTable {
    pub fn new(grants: BTreeMap<String, Vec<Permission>>, default_grants: Vec<Permission>) -> Self {
        Self {
            grants,
            default_grants,
        }
    }
}

impl Authorizer for GrantTable {
    fn check(&self, caller: &str, scheme: &str, contexts: &[PermissionContext]) -> bool {
        self.permissions(caller).check(scheme, contexts)
    }

    fn permissions(&self, caller: &str) -> Permissions {
        Permissions::new(
            self.grants
                .get(caller)
                .unwrap_or(&self.default_grants)
                .clone(),
        )
    }
}

/// Check `scheme` for `caller`, mapping a refusal to `Unauthorized`.
pub fn require(
    authorizer: &dyn Authorizer,
    caller: &str,
    scheme: &str,
    contexts: &[PermissionContext],
) -> Result<()> {
    if authorizer.check(caller, scheme, contexts) {
        Ok(())
    } else {
        Err(TollgateError::Unauthorized(format!(
            "'{}' lacks permission '{}'",
            caller, scheme
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(name: &str) -> PermissionContext {
        PermissionContext::new(ContextType::App, name)
    }

    #[test]
    fn context_parses_and_displays() {
        let ctx: PermissionContext = "app:foo".parse().unwrap();
        assert_eq!(ctx, app("foo"));
        assert_eq!(ctx.to_string(), "app:foo");
        assert!("global".parse::<PermissionContext>().unwrap().is_global());
    }

    #[test]
    fn context_rejects_unknown_type_and_empty_value() {
        assert!("galaxy:foo".parse::<PermissionContext>().is_err());
        assert!("app:".parse::<PermissionContext>().is_err());
        assert!("foo".parse::<PermissionContext>().is_err());
    }

    #[test]
    fn context_roundtrips_through_yaml_as_string() {
        let grant = Permission::new("app.deploy", app("foo"));
        let yaml = serde_yaml::to_string(&grant).unwrap();
        assert!(yaml.contains("app:foo"));
        let parsed: Permission = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, grant);
    }

    #[test]
    fn scheme_prefix_must_end_on_segment_boundary() {
        let grant = Permission::new("app", PermissionContext::global());
        assert!(grant.covers("app", &[]));
        assert!(grant.covers("app.read.events", &[]));
        assert!(!grant.covers("application.read", &[]));
    }

    #[test]
    fn root_grant_covers_everything() {
        let grant = Permission::root();
        assert!(grant.covers("event-block.add", &[]));
        assert!(grant.covers("app.deploy", &[app("foo")]));
    }

    #[test]
    fn scoped_grant_requires_matching_context() {
        let grant = Permission::new("app.read", app("foo"));
        assert!(grant.covers("app.read.events", &[app("foo"), app("bar")]));
        assert!(!grant.covers("app.read.events", &[app("bar")]));
        // Descriptors without contexts are only visible to global grants.
        assert!(!grant.covers("app.read.events", &[]));
    }

    #[test]
    fn permissions_allow_descriptor_if_any_grant_covers() {
        let perms = Permissions::new(vec![
            Permission::new("team", PermissionContext::new(ContextType::Team, "ops")),
            Permission::new("app.read", app("foo")),
        ]);
        assert!(perms.allows(&Allowed::new("app.read.events", vec![app("foo")])));
        assert!(!perms.allows(&Allowed::new("app.read.events", vec![app("baz")])));
        assert!(!Permissions::default().allows(&Allowed::new("", vec![])));
    }

    #[test]
    fn grant_table_falls_back_to_default_grants() {
        let mut grants = BTreeMap::new();
        grants.insert(
            "alice".to_string(),
            vec![Permission::new("app.read", app("foo"))],
        );
        let table = GrantTable::new(grants, vec![Permission::root()]);

        assert!(table.check("alice", "app.read.events", &[app("foo")]));
        assert!(!table.check("alice", "event-block.add", &[]));
        assert!(table.check("bob", "event-block.add", &[]));
    }

    #[test]
    fn require_maps_refusal_to_unauthorized() {
        let table = GrantTable::new(BTreeMap::new(), vec![]);
        let err = require(&table, "mallory", "event-block.add", &[]).unwrap_err();
        assert!(matches!(err, TollgateError::Unauthorized(_)));
    }
}
