//! Service configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! `session-control.{toml,yaml,json}` in the working directory, then `APP_*`
//! environment variables (`__` separates nested keys, e.g.
//! `APP_TIMEOUTS__SETTLEMENT_MS=20000`).

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

use crate::orchestrator::{CallTimeouts, MAX_SESSION_SECONDS};
use crate::retry::RetryConfig;

pub const DEV_EXECUTION_SERVICE_URL: &str = "http://localhost:3001";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunEnvironment {
    Development,
    Production,
    Test,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub port: u16,
    pub environment: RunEnvironment,
    pub log_level: String,
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub execution_service_url: Option<String>,
    /// JSON agent catalog; the builtin catalog is used when unset
    #[serde(default)]
    pub agents_file: Option<String>,
    pub timeouts: TimeoutSettings,
    pub retry: RetrySettings,
    pub session_defaults: SessionDefaults,
}

/// Per-dependency call budgets, in milliseconds
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutSettings {
    pub channel_open_ms: u64,
    pub channel_close_ms: u64,
    pub execution_ms: u64,
    pub settlement_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

/// Values applied when a start request leaves them out
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionDefaults {
    pub base_collateral_usd: Decimal,
    pub max_duration_seconds: u64,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            base_collateral_usd: Decimal::from(50),
            max_duration_seconds: 600,
        }
    }
}

impl Settings {
    /// Load from the working directory and the process environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder()?
            .add_source(File::with_name("session-control").required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Defaults only
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::builder()?.build()?.try_deserialize()
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("port", 3000)?
            .set_default("environment", "development")?
            .set_default("log_level", "info")?
            .set_default("timeouts.channel_open_ms", 10_000)?
            .set_default("timeouts.channel_close_ms", 10_000)?
            .set_default("timeouts.execution_ms", 5_000)?
            .set_default("timeouts.settlement_ms", 15_000)?
            .set_default("retry.max_attempts", 3)?
            .set_default("retry.base_delay_ms", 500)?
            .set_default("retry.max_delay_ms", 4_000)?
            .set_default("retry.jitter", true)?
            .set_default("session_defaults.base_collateral_usd", 50)?
            .set_default("session_defaults.max_duration_seconds", 600)
    }

    /// Fail fast on settings production cannot run without; elsewhere fall
    /// back with a warning.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());

        if self.environment == RunEnvironment::Production {
            if blank(&self.database_url) {
                return Err(ConfigError::Message(
                    "APP_DATABASE_URL is required in production".to_string(),
                ));
            }
            if blank(&self.execution_service_url) {
                return Err(ConfigError::Message(
                    "APP_EXECUTION_SERVICE_URL is required in production".to_string(),
                ));
            }
        } else {
            if blank(&self.database_url) {
                warn!("APP_DATABASE_URL not set, sessions are kept in memory");
                self.database_url = None;
            }
            if blank(&self.execution_service_url) {
                warn!(
                    "APP_EXECUTION_SERVICE_URL not set, using {}",
                    DEV_EXECUTION_SERVICE_URL
                );
                self.execution_service_url = Some(DEV_EXECUTION_SERVICE_URL.to_string());
            }
        }

        if self.session_defaults.base_collateral_usd <= Decimal::ZERO {
            return Err(ConfigError::Message(
                "session_defaults.base_collateral_usd must be positive".to_string(),
            ));
        }
        if !(1..=MAX_SESSION_SECONDS).contains(&self.session_defaults.max_duration_seconds) {
            return Err(ConfigError::Message(format!(
                "session_defaults.max_duration_seconds must be between 1 and {}",
                MAX_SESSION_SECONDS
            )));
        }

        Ok(())
    }

    pub fn call_timeouts(&self) -> CallTimeouts {
        CallTimeouts {
            channel_open: Duration::from_millis(self.timeouts.channel_open_ms),
            channel_close: Duration::from_millis(self.timeouts.channel_close_ms),
            execution: Duration::from_millis(self.timeouts.execution_ms),
            settlement: Duration::from_millis(self.timeouts.settlement_ms),
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry.max_attempts,
            base_delay_ms: self.retry.base_delay_ms,
            max_delay_ms: self.retry.max_delay_ms,
            jitter: self.retry.jitter,
        }
    }
}
