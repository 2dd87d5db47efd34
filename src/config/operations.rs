//! Config loading, validation, and utility operations.

use super::model::Config;
use crate::error::{Result, TollgateError};
use crate::permission::GrantTable;
use globset::Glob;
use std::path::Path;
use std::time::Duration;

impl Config {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            TollgateError::Store(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Load config if the file exists, otherwise fall back to defaults.
    ///
    /// A file that exists but fails to parse or validate is still an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml).map_err(|e| {
            TollgateError::InvalidInput(format!("failed to parse config YAML: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| TollgateError::Store(format!("failed to serialize config to YAML: {}", e)))
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - `lock_stale_minutes` must be positive
    /// - `cancel_poll_interval_ms` must be positive
    /// - `deploy_kinds` entries must be non-empty
    /// - `sensitive_env_globs` entries must be valid glob patterns
    pub fn validate(&self) -> Result<()> {
        if self.lock_stale_minutes == 0 {
            return Err(TollgateError::InvalidInput(
                "config validation failed: lock_stale_minutes must be greater than 0".to_string(),
            ));
        }

        if self.cancel_poll_interval_ms == 0 {
            return Err(TollgateError::InvalidInput(
                "config validation failed: cancel_poll_interval_ms must be greater than 0"
                    .to_string(),
            ));
        }

        if self.deploy_kinds.iter().any(|k| k.trim().is_empty()) {
            return Err(TollgateError::InvalidInput(
                "config validation failed: deploy_kinds entries must be non-empty".to_string(),
            ));
        }

        for pattern in &self.sensitive_env_globs {
            Glob::new(pattern).map_err(|e| {
                TollgateError::InvalidInput(format!(
                    "config validation failed: invalid sensitive_env_globs pattern '{}': {}",
                    pattern, e
                ))
            })?;
        }

        Ok(())
    }

    pub fn cancel_poll_interval(&self) -> Duration {
        Duration::from_millis(self.cancel_poll_interval_ms)
    }

    /// Build the grant table used to authorize CLI callers.
    pub fn grant_table(&self) -> GrantTable {
        GrantTable::new(self.grants.clone(), self.default_grants.clone())
    }
}
