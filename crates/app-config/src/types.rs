// In crates/app-config/src/types.rs

use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    /// The application's general settings.
    pub app: AppSettings,
    /// Settings for the upstream quote and FX feeds.
    pub price_feed: PriceFeedSettings,
    /// Settings for the ledger store.
    pub database: DatabaseSettings,
    pub server: ServerSettings,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub trading: TradingSettings,
}

impl Settings {
    /// Rejects combinations that deserialize fine but cannot run.
    pub fn validate(&self) -> Result<()> {
        if self.database.backend == DatabaseBackend::Postgres && self.database.url.is_empty() {
            return Err(Error::Invalid("database.url is required for the postgres backend".into()));
        }
        if self.engine.poll_interval_secs == 0 {
            return Err(Error::Invalid("engine.poll_interval_secs must be at least 1".into()));
        }
        if self.price_feed.fallback_fx_rate <= Decimal::ZERO {
            return Err(Error::Invalid("price_feed.fallback_fx_rate must be positive".into()));
        }
        if self.price_feed.fx_cache_ttl_secs == 0 {
            return Err(Error::Invalid("price_feed.fx_cache_ttl_secs must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct AppSettings {
    /// The environment the application is running in (e.g., "development", "production").
    pub environment: String,
    /// The log level for the application.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct PriceFeedSettings {
    /// Base URL of the quote API (Finnhub-compatible `GET /quote`).
    pub quote_base_url: String,
    pub quote_api_key: String,
    /// Base URL of the exchange-rate API (`GET /v6/{key}/latest/{base}`).
    pub fx_base_url: String,
    pub fx_api_key: String,
    /// Currency the upstream quotes are denominated in.
    #[serde(default = "default_base_currency")]
    pub base_currency: String,
    /// Currency balances and prices are shown in.
    #[serde(default = "default_display_currency")]
    pub display_currency: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Pause between consecutive upstream calls in a batch.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "default_fx_cache_ttl_secs")]
    pub fx_cache_ttl_secs: u64,
    /// Used when the FX feed fails and no rate was ever cached.
    #[serde(default = "default_fallback_fx_rate")]
    pub fallback_fx_rate: Decimal,
}

impl PriceFeedSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn fx_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.fx_cache_ttl_secs)
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Postgres,
    /// Process memory. For tests and demos: nothing persists and each commit copies the ledger.
    Memory,
}

#[derive(Deserialize, Debug, Clone)]
pub struct DatabaseSettings {
    #[serde(default = "default_backend")]
    pub backend: DatabaseBackend,
    /// The connection URL for the PostgreSQL database.
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Debug, Clone)]
pub struct EngineSettings {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl EngineSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            enabled: default_enabled(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct TradingSettings {
    /// How many times a trade is re-planned after a concurrent write invalidated it.
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,
}

impl Default for TradingSettings {
    fn default() -> Self {
        Self {
            max_conflict_retries: default_max_conflict_retries(),
        }
    }
}

/// Helper functions for serde defaults
fn default_log_level() -> String { "info".to_string() }
fn default_base_currency() -> String { "USD".to_string() }
fn default_display_currency() -> String { "INR".to_string() }
fn default_request_timeout_secs() -> u64 { 10 }
fn default_request_delay_ms() -> u64 { 500 }
fn default_fx_cache_ttl_secs() -> u64 { 60 * 60 }
fn default_fallback_fx_rate() -> Decimal { Decimal::new(830, 1) }
fn default_backend() -> DatabaseBackend { DatabaseBackend::Postgres }
fn default_max_connections() -> u32 { 5 }
fn default_poll_interval_secs() -> u64 { 60 }
fn default_enabled() -> bool { true }
fn default_max_conflict_retries() -> u32 { 3 }
