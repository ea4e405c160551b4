use std::{fmt, time::Duration};

use beacon_core::provision::is_valid_identifier;
use thiserror::Error;

use crate::models::Config;

/// Largest batch a single receive may return.
pub const MAX_BATCH_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.hint {
            Some(hint) => write!(f, "{} ({hint})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Non-fatal findings collected while loading configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigWarnings {
    items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push(&mut self, message: impl Into<String>) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint(
        &mut self,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigWarning> {
        self.items.iter()
    }
}

impl IntoIterator for ConfigWarnings {
    type Item = ConfigWarning;
    type IntoIter = std::vec::IntoIter<ConfigWarning>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// Values the pipeline cannot run with.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigGuardRailError {
    #[error("consumer.max_messages must be between 1 and {MAX_BATCH_SIZE}, got {value}")]
    MaxMessagesOutOfRange { value: usize },
    #[error("consumer.visibility_timeout must be greater than zero")]
    ZeroVisibilityTimeout,
    #[error("store.table {table:?} is not a plain SQL identifier")]
    InvalidTableName { table: String },
    #[error("queue.name must not be empty")]
    EmptyQueueName,
    #[error("database.max_connections must be greater than zero")]
    ZeroMaxConnections,
    #[error("consumer.max_receive_count must be at least 1; omit it to redeliver forever")]
    ZeroMaxReceiveCount,
}

pub fn apply_guard_rails(
    config: &Config,
) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();
    let consumer = &config.consumer;

    if !(1..=MAX_BATCH_SIZE).contains(&consumer.max_messages) {
        return Err(ConfigGuardRailError::MaxMessagesOutOfRange {
            value: consumer.max_messages,
        });
    }
    if consumer.visibility_timeout.is_zero() {
        return Err(ConfigGuardRailError::ZeroVisibilityTimeout);
    }
    if consumer.max_receive_count == Some(0) {
        return Err(ConfigGuardRailError::ZeroMaxReceiveCount);
    }
    if !is_valid_identifier(&config.store.table) {
        return Err(ConfigGuardRailError::InvalidTableName {
            table: config.store.table.clone(),
        });
    }
    if config.queue.name.trim().is_empty() {
        return Err(ConfigGuardRailError::EmptyQueueName);
    }
    if config.database.max_connections == 0 {
        return Err(ConfigGuardRailError::ZeroMaxConnections);
    }

    if consumer.wait_time.is_zero() {
        warnings.push_with_hint(
            "consumer.wait_time is zero; the consumer will busy-poll an empty queue",
            "Set a wait time of a few seconds to long-poll instead",
        );
    }
    if consumer.visibility_timeout < consumer.wait_time {
        warnings.push(format!(
            "consumer.visibility_timeout ({}) is shorter than consumer.wait_time ({})",
            humantime::format_duration(consumer.visibility_timeout),
            humantime::format_duration(consumer.wait_time),
        ));
    }
    if config.calls.timeout == Duration::ZERO {
        warnings.push_with_hint(
            "calls.timeout is zero; store and queue calls run unbounded",
            "Remove the setting to use the default of 10s",
        );
    }
    if config.database.url.is_none() {
        warnings.push_with_hint(
            "No database URL configured; only in-memory backends are available",
            "Set DATABASE_URL or database.url in beacon.toml",
        );
    }

    Ok(warnings)
}
