//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (app key/secret, webhook URL) are referenced by env-var name
//! in the config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub broker: BrokerConfig,
    pub trading: TradingConfig,
    pub dashboard: DashboardConfig,
    pub alerts: AlertsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BrokerConfig {
    /// Base URL of the brokerage open API (paper-trading host by default).
    pub base_url: String,
    /// Env var holding the app key.
    pub app_key_env: String,
    /// Env var holding the app secret.
    pub app_secret_env: String,
    /// Comprehensive account number (CANO).
    pub account_no: String,
    /// Account product code (ACNT_PRDT_CD), "01" for equities.
    pub account_product_code: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TradingConfig {
    /// Cap on a single domestic buy, in KRW. The overseas segment has no
    /// cap and spends the full deposit.
    pub buy_cap_krw: f64,
    /// Momentum lookback in trading days (~6 months).
    #[serde(default = "default_lookback_days")]
    pub lookback_days: usize,
    /// Sleep after a completed cycle while the market is open.
    #[serde(default = "default_cycle_interval_secs")]
    pub cycle_interval_secs: u64,
    /// Sleep between re-checks while the market is closed.
    #[serde(default = "default_closed_poll_secs")]
    pub closed_poll_secs: u64,
    /// Sleep after a failed cycle before retrying.
    #[serde(default = "default_recovery_secs")]
    pub recovery_secs: u64,
    /// Delay between consecutive order submissions (API rate limit).
    #[serde(default = "default_order_delay_secs")]
    pub order_delay_secs: u64,
}

fn default_lookback_days() -> usize {
    126
}
fn default_cycle_interval_secs() -> u64 {
    3600
}
fn default_closed_poll_secs() -> u64 {
    600
}
fn default_recovery_secs() -> u64 {
    60
}
fn default_order_delay_secs() -> u64 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertsConfig {
    /// Env var holding the Discord webhook URL; alerts are disabled when
    /// unset.
    pub discord_webhook_env: Option<String>,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Resolve an env-var reference into a secret (never logged).
    pub fn resolve_secret(env_name: &str) -> Result<SecretString> {
        Ok(SecretString::new(Self::resolve_env(env_name)?))
    }
}
