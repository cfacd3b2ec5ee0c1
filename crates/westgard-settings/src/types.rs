//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`,
//! so a settings file may name only the values it changes.

use serde::{Deserialize, Serialize};
use westgard_core::{RuleConfig, RuleDefinition};

use crate::errors::{Result, SettingsError};

/// Log levels accepted by `logging.level`.
pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Root settings type.
///
/// ```json
/// {
///   "database": { "path": "/var/lib/westgard/qc.db" },
///   "logging": { "level": "debug", "json": true },
///   "engine": { "useDefaultCatalog": false },
///   "rules": [ { "id": "lab.1-25s", "code": "1-2.5s", "windowSize": 1,
///                "thresholdSd": 2.5, "severity": "warning" } ]
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WestgardSettings {
    /// Settings schema version.
    pub version: String,
    /// Database location.
    pub database: DatabaseSettings,
    /// Log output.
    pub logging: LoggingSettings,
    /// Evaluation engine tunables.
    pub engine: EngineSettings,
    /// Extra rule records seeded alongside (or instead of) the catalog.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<RuleConfig>>,
}

impl Default for WestgardSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            database: DatabaseSettings::default(),
            logging: LoggingSettings::default(),
            engine: EngineSettings::default(),
            rules: None,
        }
    }
}

impl WestgardSettings {
    /// Reject values the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(SettingsError::InvalidValue(format!(
                "logging.level must be one of {}, got {:?}",
                LOG_LEVELS.join("/"),
                self.logging.level
            )));
        }
        if self.engine.lock_prune_threshold == 0 {
            return Err(SettingsError::InvalidValue(
                "engine.lockPruneThreshold must be at least 1".into(),
            ));
        }
        for rule in self.rules.iter().flatten() {
            let _ = RuleDefinition::try_from_config(rule)
                .map_err(|e| SettingsError::InvalidValue(format!("rules: {e}")))?;
        }
        Ok(())
    }
}

/// Database location.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseSettings {
    /// Path to the SQLite file. A leading `~/` is expanded; unset means
    /// `~/.westgard/westgard.db`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Log output.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Level used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Evaluation engine tunables.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    /// Seed the standard Westgard rules when seeding rules.
    pub use_default_catalog: bool,
    /// Tracked contexts above which idle lock entries are pruned.
    pub lock_prune_threshold: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            use_default_catalog: true,
            lock_prune_threshold: 128,
        }
    }
}
