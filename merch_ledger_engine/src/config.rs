use std::{env, fmt::Display, str::FromStr, time::Duration};

use log::*;
use merch_common::parse_boolean_flag;
use thiserror::Error;

const DEFAULT_DATABASE_URL: &str = "sqlite://data/merch_ledger.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MAX_TX_RETRIES: u32 = 5;
const DEFAULT_EVENT_BUFFER_SIZE: usize = 25;

#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("{var} has an invalid value '{value}'. {reason}")]
    InvalidValue { var: &'static str, value: String, reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// How long a connection waits for SQLite's write lock before giving up with `SQLITE_BUSY`.
    pub busy_timeout: Duration,
    /// How many times a transaction is attempted when it loses a race for the write lock.
    pub max_tx_retries: u32,
    /// Channel capacity for each event hook.
    pub event_buffer_size: usize,
    /// When true, verifying a payment fails if its transaction id is already attached to another verified payment.
    pub reject_duplicate_transaction_ids: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            max_tx_retries: DEFAULT_MAX_TX_RETRIES,
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
            reject_duplicate_transaction_ids: false,
        }
    }
}

impl LedgerConfig {
    pub fn new<S: Into<String>>(database_url: S) -> Self {
        Self { database_url: database_url.into(), ..Default::default() }
    }

    pub fn with_max_tx_retries(mut self, retries: u32) -> Self {
        self.max_tx_retries = retries;
        self
    }

    pub fn with_duplicate_transaction_check(mut self, enabled: bool) -> Self {
        self.reject_duplicate_transaction_ids = enabled;
        self
    }

    /// Reads the configuration from `MLE_*` environment variables. Values that are missing use the default. Values
    /// that cannot be parsed are logged as errors and also use the default.
    pub fn from_env_or_default() -> Self {
        let database_url = env::var("MLE_DATABASE_URL").ok().unwrap_or_else(|| {
            info!("🪛️ MLE_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let max_connections = env_or_default("MLE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS);
        let busy_timeout = Duration::from_millis(env_or_default("MLE_BUSY_TIMEOUT_MS", DEFAULT_BUSY_TIMEOUT_MS));
        let max_tx_retries = env_or_default("MLE_MAX_TX_RETRIES", DEFAULT_MAX_TX_RETRIES);
        let event_buffer_size = env_or_default("MLE_EVENT_BUFFER_SIZE", DEFAULT_EVENT_BUFFER_SIZE);
        let reject_duplicate_transaction_ids =
            parse_boolean_flag(env::var("MLE_REJECT_DUPLICATE_TRANSACTION_IDS").ok(), false);
        Self {
            database_url,
            max_connections,
            busy_timeout,
            max_tx_retries,
            event_buffer_size,
            reject_duplicate_transaction_ids,
        }
    }

    /// As for [`Self::from_env_or_default`], but invalid values are reported instead of replaced.
    pub fn try_from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(url) = env::var("MLE_DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(v) = try_env("MLE_MAX_CONNECTIONS")? {
            config.max_connections = v;
        }
        if let Some(v) = try_env("MLE_BUSY_TIMEOUT_MS")? {
            config.busy_timeout = Duration::from_millis(v);
        }
        if let Some(v) = try_env("MLE_MAX_TX_RETRIES")? {
            config.max_tx_retries = v;
        }
        if let Some(v) = try_env("MLE_EVENT_BUFFER_SIZE")? {
            config.event_buffer_size = v;
        }
        config.reject_duplicate_transaction_ids =
            parse_boolean_flag(env::var("MLE_REJECT_DUPLICATE_TRANSACTION_IDS").ok(), false);
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                var: "MLE_MAX_CONNECTIONS",
                value: "0".into(),
                reason: "At least one connection is required.".into(),
            });
        }
        if self.max_tx_retries == 0 {
            return Err(ConfigError::InvalidValue {
                var: "MLE_MAX_TX_RETRIES",
                value: "0".into(),
                reason: "Every transaction needs at least one attempt.".into(),
            });
        }
        if self.event_buffer_size == 0 {
            return Err(ConfigError::InvalidValue {
                var: "MLE_EVENT_BUFFER_SIZE",
                value: "0".into(),
                reason: "Event channels need room for at least one event.".into(),
            });
        }
        Ok(())
    }
}

fn env_or_default<T>(var: &'static str, default: T) -> T
where
    T: FromStr + Display + PartialOrd + Default,
    T::Err: Display,
{
    match try_env::<T>(var) {
        Ok(Some(v)) if v > T::default() => v,
        Ok(Some(v)) => {
            error!("🪛️ {v} is not a valid value for {var}. Using the default, {default}, instead.");
            default
        },
        Ok(None) => default,
        Err(e) => {
            error!("🪛️ {e} Using the default, {default}, instead.");
            default
        },
    }
}

fn try_env<T>(var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(var) {
        Ok(s) => s.trim().parse::<T>().map(Some).map_err(|e| ConfigError::InvalidValue {
            var,
            value: s.clone(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(None),
    }
}
