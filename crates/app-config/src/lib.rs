// In crates/app-config/src/lib.rs

use config::{Config, Environment, File};

pub mod error;
pub mod types;

// Re-export the most important types for easy access.
pub use error::{Error, Result};
pub use types::{
    AppSettings, DatabaseBackend, DatabaseSettings, EngineSettings, PriceFeedSettings,
    ServerSettings, Settings, TradingSettings,
};

/// Loads the application settings from various sources.
///
/// This function orchestrates the layered configuration loading:
/// 1. Reads from a default `base.toml` file.
/// 2. Merges settings from an environment-specific file (e.g., `development.toml`).
/// 3. Merges settings from environment variables.
pub fn load_settings() -> Result<Settings> {
    load_settings_from("config")
}

/// Same as [`load_settings`], reading the TOML files from `dir`.
pub fn load_settings_from(dir: &str) -> Result<Settings> {
    // Get the current environment. Default to "development" if not set.
    let environment = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "development".into());

    let settings = Config::builder()
        .add_source(File::with_name(&format!("{}/base", dir)))
        .add_source(File::with_name(&format!("{}/{}", dir, environment)).required(false))
        // e.g. `APP_DATABASE__URL=...` or `APP_PRICE_FEED__QUOTE_API_KEY=...`.
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let settings: Settings = settings.try_deserialize()?;
    settings.validate()?;

    Ok(settings)
}

/// Parses a complete settings document without consulting files or the environment.
pub fn settings_from_toml(content: &str) -> Result<Settings> {
    let settings: Settings = toml::from_str(content)?;
    settings.validate()?;
    Ok(settings)
}
