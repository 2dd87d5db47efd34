//! Read-path redaction of sensitive deploy data.

use crate::config::Config;
use crate::error::{Result, TollgateError};
use crate::model::Event;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde_json::Value;

pub const REDACTED: &str = "*** (private variable)";

/// Redact private environment values in the start payload of deploy events.
///
/// Only the in-memory event is touched; stored records keep their data.
pub fn suppress_sensitive_envs(event: &mut Event, config: &Config) -> Result<()> {
    if !config.suppress_sensitive_envs || !config.deploy_kinds.contains(&event.kind.name) {
        return Ok(());
    }

    let globs = build_globs(&config.sensitive_env_globs)?;

    let Some(envs) = event
        .start_custom_data
        .get_mut("app")
        .and_then(|app| app.get_mut("env"))
    else {
        return Ok(());
    };

    match envs {
        Value::Array(entries) => {
            for entry in entries {
                let name = entry
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                redact_entry(&name, entry, &globs);
            }
        }
        Value::Object(map) => {
            for (name, entry) in map.iter_mut() {
                redact_entry(name, entry, &globs);
            }
        }
        _ => {}
    }

    Ok(())
}

fn redact_entry(name: &str, entry: &mut Value, globs: &GlobSet) {
    let Some(fields) = entry.as_object_mut() else {
        return;
    };
    let private = fields.get("public").and_then(Value::as_bool) == Some(false);
    if private || globs.is_match(name) {
        fields.insert("value".to_string(), Value::String(REDACTED.to_string()));
    }
}

fn build_globs(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| {
            TollgateError::InvalidInput(format!("invalid env glob '{}': {}", pattern, e))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| TollgateError::InvalidInput(format!("invalid env globs: {}", e)))
}
