//! Engine configuration
//!
//! Defaults are usable as-is; `EngineConfig::from_env` overrides them from
//! `ACTION_ENGINE_*` environment variables.

use crate::error::ActionError;
use crate::retry::{Backoff, RetryConfig};
use crate::safety::SafetyPolicy;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

const ENV_PREFIX: &str = "ACTION_ENGINE_";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub retry: RetryConfig,
    pub safety: SafetyPolicy,
    pub scrape_timeout_secs: u64,
    /// Maximum entries kept in the recent-action history
    pub history_limit: usize,
    pub history_ttl_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            safety: SafetyPolicy::default(),
            scrape_timeout_secs: 30,
            history_limit: 50,
            history_ttl_secs: 24 * 60 * 60,
        }
    }
}

impl EngineConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));
        let mut config = Self::default();

        if let Some(v) = get("MAX_RETRIES") {
            config.retry.max_retries = parse_value("MAX_RETRIES", &v)?;
        }
        if let Some(v) = get("BACKOFF_MS") {
            config.retry.backoff_ms = parse_value("BACKOFF_MS", &v)?;
        }
        if let Some(v) = get("BACKOFF") {
            config.retry.backoff = parse_value("BACKOFF", &v)?;
        }
        if let Some(v) = get("MAX_TRADE_QUANTITY") {
            config.safety.max_trade_quantity = parse_value("MAX_TRADE_QUANTITY", &v)?;
        }
        if let Some(v) = get("MAX_SYMBOL_LEN") {
            config.safety.max_symbol_len = parse_value("MAX_SYMBOL_LEN", &v)?;
        }
        if let Some(v) = get("MAX_QUERY_LEN") {
            config.safety.max_query_len = parse_value("MAX_QUERY_LEN", &v)?;
        }
        if let Some(v) = get("ALLOW_PRIVATE_HOSTS") {
            config.safety.allow_private_hosts = parse_value("ALLOW_PRIVATE_HOSTS", &v)?;
        }
        if let Some(v) = get("SCRAPE_TIMEOUT_SECS") {
            config.scrape_timeout_secs = parse_value("SCRAPE_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("HISTORY_LIMIT") {
            config.history_limit = parse_value("HISTORY_LIMIT", &v)?;
        }
        if let Some(v) = get("HISTORY_TTL_SECS") {
            config.history_ttl_secs = parse_value("HISTORY_TTL_SECS", &v)?;
        }

        Ok(config)
    }

    pub fn scrape_timeout(&self) -> Duration {
        Duration::from_secs(self.scrape_timeout_secs)
    }

    pub fn history_ttl(&self) -> Duration {
        Duration::from_secs(self.history_ttl_secs)
    }
}

fn parse_value<T: FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim().parse::<T>().map_err(|_| {
        ActionError::Config(format!(
            "{}{} has an invalid value: {:?}",
            ENV_PREFIX, name, raw
        ))
    })
}

impl FromStr for Backoff {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(Backoff::None),
            "fixed" => Ok(Backoff::Fixed),
            "linear" => Ok(Backoff::Linear),
            other => Err(ActionError::Config(format!("Unknown backoff strategy: {}", other))),
        }
    }
}
