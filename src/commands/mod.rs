//! Command implementations for tollgate.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations, plus the per-invocation [`Session`] they share.

mod block;
mod event;
mod init;
mod journal;
mod lock;
mod run;

use crate::cli::{BlockAction, Cli, Command, EventAction, LockAction};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;
use tollgate::config::Config;
use tollgate::context::{StoreContext, require_initialized_store};
use tollgate::error::{Result, TollgateError};
use tollgate::locks::instance_string;
use tollgate::model::Target;
use tollgate::permission::{self, Authorizer, ContextType, GrantTable, PermissionContext, Permissions};

/// Store, config and caller of one CLI invocation.
#[derive(Debug, Clone)]
pub struct Session {
    pub ctx: StoreContext,
    pub config: Config,
    pub caller: String,
    grants: GrantTable,
}

impl Session {
    /// Resolve an initialized store and load its config.
    pub fn open(store: Option<&Path>, caller: Option<String>) -> Result<Self> {
        let ctx = require_initialized_store(store)?;
        let config = Config::load_or_default(ctx.config_path())?;
        Ok(Self::new(ctx, config, caller.unwrap_or_else(instance_string)))
    }

    pub fn new(ctx: StoreContext, config: Config, caller: String) -> Self {
        let grants = config.grant_table();
        Self {
            ctx,
            config,
            caller,
            grants,
        }
    }

    /// Require the caller to hold `scheme` in one of `contexts`.
    pub fn require(&self, scheme: &str, contexts: &[PermissionContext]) -> Result<()> {
        permission::require(&self.grants, &self.caller, scheme, contexts)
    }

    /// The caller's grants, used to scope queries.
    pub fn permissions(&self) -> Permissions {
        self.grants.permissions(&self.caller)
    }
}

/// Dispatch a command to its implementation.
pub fn dispatch(cli: Cli) -> Result<()> {
    if let Command::Init = cli.command {
        return init::cmd_init(cli.store.as_deref(), cli.caller);
    }

    let session = Session::open(cli.store.as_deref(), cli.caller)?;

    match cli.command {
        Command::Init => Ok(()),
        Command::Event(cmd) => match cmd.action {
            EventAction::List(args) => event::cmd_event_list(&session, args),
            EventAction::Kinds(args) => event::cmd_event_kinds(&session, args),
            EventAction::Info(args) => event::cmd_event_info(&session, args),
            EventAction::Cancel(args) => event::cmd_event_cancel(&session, args),
            EventAction::Run(args) => run::cmd_event_run(&session, args),
        },
        Command::Block(cmd) => match cmd.action {
            BlockAction::List(args) => block::cmd_block_list(&session, args),
            BlockAction::Add(args) => block::cmd_block_add(&session, args),
            BlockAction::Remove(args) => block::cmd_block_remove(&session, args),
        },
        Command::Lock(cmd) => match cmd.action {
            LockAction::List => lock::cmd_lock_list(&session),
            LockAction::Clear(args) => lock::cmd_lock_clear(&session, args),
        },
        Command::Journal(args) => journal::cmd_journal(&session, args),
    }
}

/// Permission contexts an operation on `target` is evaluated in.
///
/// Targets whose type names a context type (`app:foo`) map to that context;
/// anything else is only visible to global grants.
pub(crate) fn target_contexts(target: &Target) -> Vec<PermissionContext> {
    match ContextType::parse(&target.target_type) {
        Some(ContextType::Global) | None => Vec::new(),
        Some(ctx_type) => vec![PermissionContext::new(ctx_type, target.value.clone())],
    }
}

/// Parse `key=value` pairs into a JSON object (`null` when empty).
pub(crate) fn parse_data(pairs: &[String]) -> Result<Value> {
    if pairs.is_empty() {
        return Ok(Value::Null);
    }
    let mut map = Map::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .filter(|(k, _)| !k.trim().is_empty())
            .ok_or_else(|| {
                TollgateError::InvalidInput(format!("data entry '{}' must be key=value", pair))
            })?;
        map.insert(key.trim().to_string(), Value::String(value.to_string()));
    }
    Ok(Value::Object(map))
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| TollgateError::Store(format!("failed to serialize output: {}", e)))?;
    println!("{}", json);
    Ok(())
}

/// Empty results are reported on stderr so stdout stays empty.
pub(crate) fn print_no_content() {
    eprintln!("no content");
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Session;
    use tempfile::TempDir;
    use tollgate::config::Config;
    use tollgate::context::StoreContext;

    pub(crate) fn test_session() -> (TempDir, Session) {
        session_with(Config::default())
    }

    pub(crate) fn session_with(config: Config) -> (TempDir, Session) {
        let temp_dir = TempDir::new().unwrap();
        let ctx = StoreContext::at(temp_dir.path().join("store")).unwrap();
        ctx.create_layout().unwrap();
        (temp_dir, Session::new(ctx, config, "tester".to_string()))
    }
}
