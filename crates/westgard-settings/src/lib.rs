//! # westgard-settings
//!
//! Configuration with layered sources for the Westgard QC service.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`WestgardSettings::default()`]
//! 2. **User file**: `~/.westgard/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `WESTGARD_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    database_path, deep_merge, load_settings, load_settings_from_path, load_with_env,
    settings_path, westgard_home,
};
pub use types::{DatabaseSettings, EngineSettings, LoggingSettings, WestgardSettings};

use std::sync::OnceLock;

/// Global settings singleton.
static SETTINGS: OnceLock<WestgardSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// On first call, loads settings from `~/.westgard/settings.json` with env
/// var overrides. If loading fails, returns compiled defaults.
pub fn get_settings() -> &'static WestgardSettings {
    SETTINGS.get_or_init(|| {
        load_settings().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            WestgardSettings::default()
        })
    })
}

/// Initialize the global settings with a specific value.
///
/// Returns the settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: WestgardSettings) -> std::result::Result<(), WestgardSettings> {
    SETTINGS.set(settings)
}
