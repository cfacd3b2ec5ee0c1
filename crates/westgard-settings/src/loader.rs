//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`WestgardSettings::default()`]
//! 2. If `~/.westgard/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `WESTGARD_*` environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{LOG_LEVELS, WestgardSettings};

/// Directory holding the settings file and the default database.
pub fn westgard_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".westgard")
}

/// Resolve the path to the settings file (`~/.westgard/settings.json`).
pub fn settings_path() -> PathBuf {
    westgard_home().join("settings.json")
}

/// Resolve the database path from settings, expanding a leading `~/`.
pub fn database_path(settings: &WestgardSettings) -> PathBuf {
    match settings.database.path.as_deref() {
        None => westgard_home().join("westgard.db"),
        Some(path) => match path.strip_prefix("~/") {
            Some(rest) => {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(rest)
            }
            None => PathBuf::from(path),
        },
    }
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<WestgardSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON or invalid values, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<WestgardSettings> {
    load_with_env(path, |name| std::env::var(name).ok())
}

/// [`load_settings_from_path`] with an explicit environment lookup.
pub fn load_with_env(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Result<WestgardSettings> {
    let defaults = serde_json::to_value(WestgardSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: WestgardSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings, env);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `WESTGARD_*` overrides read through `env`.
///
/// Invalid values are ignored with a warning (file/default value stays).
pub fn apply_env_overrides(settings: &mut WestgardSettings, env: impl Fn(&str) -> Option<String>) {
    if let Some(v) = read_string(&env, "WESTGARD_DB_PATH") {
        settings.database.path = Some(v);
    }
    if let Some(v) = read_level(&env, "WESTGARD_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_bool(&env, "WESTGARD_LOG_JSON") {
        settings.logging.json = v;
    }
    if let Some(v) = read_bool(&env, "WESTGARD_DEFAULT_CATALOG") {
        settings.engine.use_default_catalog = v;
    }
    if let Some(v) = read_usize(&env, "WESTGARD_LOCK_PRUNE_THRESHOLD", 1, 1_000_000) {
        settings.engine.lock_prune_threshold = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a log level name, case-insensitive.
pub fn parse_level(val: &str) -> Option<String> {
    let lower = val.to_lowercase();
    LOG_LEVELS.contains(&lower.as_str()).then_some(lower)
}

// ── Env readers ─────────────────────────────────────────────────────────────

fn read_string(env: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    env(name).filter(|v| !v.is_empty())
}

fn read_bool(env: &impl Fn(&str) -> Option<String>, name: &str) -> Option<bool> {
    let val = env(name)?;
    let result = parse_bool(&val);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_usize(
    env: &impl Fn(&str) -> Option<String>,
    name: &str,
    min: usize,
    max: usize,
) -> Option<usize> {
    let val = env(name)?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}

fn read_level(env: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    let val = env(name)?;
    let result = parse_level(&val);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid log level env var, ignoring");
    }
    result
}
