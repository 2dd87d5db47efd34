//! Implementation of the `tollgate init` command.
//!
//! Creates the store layout and a default `config.yaml`. Running it again is
//! harmless: existing records and config are left untouched, and an existing
//! config is only validated.

use std::path::Path;
use tollgate::config::Config;
use tollgate::context::StoreContext;
use tollgate::error::Result;
use tollgate::fs::atomic_write;
use tollgate::journal::{self, JournalAction, JournalEntry};
use tollgate::locks::instance_string;

pub fn cmd_init(store: Option<&Path>, caller: Option<String>) -> Result<()> {
    let ctx = StoreContext::resolve(store)?;
    let already_initialized = ctx.is_initialized();

    ctx.create_layout()?;

    let config_path = ctx.config_path();
    if config_path.exists() {
        Config::load(&config_path)?;
    } else {
        atomic_write(&config_path, Config::default().to_yaml()?.as_bytes())?;
    }

    if already_initialized {
        println!("tollgate store already initialized at {}", ctx.root.display());
        return Ok(());
    }

    journal::record(
        &ctx,
        JournalEntry::new(JournalAction::Init, caller.unwrap_or_else(instance_string))
            .with_details(serde_json::json!({ "store": ctx.root.display().to_string() })),
    );

    println!("Initialized tollgate store at {}", ctx.root.display());
    Ok(())
}
