use std::{path::PathBuf, time::Duration};

use beacon_core::ConsumerConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub store: StoreConfig,
    pub queue: QueueConfig,
    pub consumer: ConsumerSettings,
    pub calls: CallsConfig,
    pub metadata: ConfigMetadata,
}

impl Config {
    /// Consumer tuning in the shape the event consumer expects.
    pub fn consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig {
            max_messages: self.consumer.max_messages,
            wait_time: self.consumer.wait_time,
            visibility_timeout: self.consumer.visibility_timeout,
            max_receive_count: self.consumer.max_receive_count,
            error_backoff: self.consumer.error_backoff,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub table: String,
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub name: String,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub max_messages: usize,
    pub wait_time: Duration,
    pub visibility_timeout: Duration,
    pub max_receive_count: Option<u32>,
    pub error_backoff: Duration,
}

#[derive(Debug, Clone)]
pub struct CallsConfig {
    /// Bound applied to each store and queue call made on behalf of a client.
    /// Zero disables the bound.
    pub timeout: Duration,
}

impl CallsConfig {
    pub fn per_call_timeout(&self) -> Option<Duration> {
        (!self.timeout.is_zero()).then_some(self.timeout)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}
