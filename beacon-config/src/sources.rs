use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as defined in a TOML file.
///
/// Durations are humantime strings such as `"250ms"` or `"5s"`.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub database: FileDatabaseConfig,
    #[serde(default)]
    pub store: FileStoreConfig,
    #[serde(default)]
    pub queue: FileQueueConfig,
    #[serde(default)]
    pub consumer: FileConsumerConfig,
    #[serde(default)]
    pub calls: FileCallsConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileDatabaseConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<u32>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileStoreConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileQueueConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileConsumerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_messages: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_receive_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_backoff: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileCallsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

/// Environment-derived configuration values.
///
/// Values are kept raw; numbers and durations are parsed while composing so
/// a malformed variable fails the load instead of falling back to a default.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub server_host: Option<String>,
    pub server_port: Option<String>,
    pub database_url: Option<String>,
    pub database_max_connections: Option<String>,
    pub incident_table: Option<String>,
    pub queue_name: Option<String>,
    pub queue_poll_interval: Option<String>,
    pub consumer_max_messages: Option<String>,
    pub consumer_wait_time: Option<String>,
    pub consumer_visibility_timeout: Option<String>,
    pub consumer_max_receive_count: Option<String>,
    pub consumer_error_backoff: Option<String>,
    pub call_timeout: Option<String>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self {
            config_path: non_empty_var("BEACON_CONFIG").map(PathBuf::from),
            server_host: non_empty_var("SERVER_HOST"),
            server_port: non_empty_var("SERVER_PORT"),
            database_url: non_empty_var("DATABASE_URL"),
            database_max_connections: non_empty_var("DATABASE_MAX_CONNECTIONS"),
            incident_table: non_empty_var("BEACON_INCIDENT_TABLE"),
            queue_name: non_empty_var("BEACON_QUEUE_NAME"),
            queue_poll_interval: non_empty_var("BEACON_QUEUE_POLL_INTERVAL"),
            consumer_max_messages: non_empty_var("BEACON_CONSUMER_MAX_MESSAGES"),
            consumer_wait_time: non_empty_var("BEACON_CONSUMER_WAIT_TIME"),
            consumer_visibility_timeout: non_empty_var(
                "BEACON_CONSUMER_VISIBILITY_TIMEOUT",
            ),
            consumer_max_receive_count: non_empty_var(
                "BEACON_CONSUMER_MAX_RECEIVE_COUNT",
            ),
            consumer_error_backoff: non_empty_var(
                "BEACON_CONSUMER_ERROR_BACKOFF",
            ),
            call_timeout: non_empty_var("BEACON_CALL_TIMEOUT"),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|value| !value.is_empty())
}
