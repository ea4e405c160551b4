use std::{
    fs,
    num::ParseIntError,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use beacon_core::{DEFAULT_INCIDENT_TABLE, DEFAULT_QUEUE_NAME};
use thiserror::Error;

use crate::{
    models::{
        CallsConfig, Config, ConfigMetadata, ConsumerSettings, DatabaseConfig,
        QueueConfig, ServerConfig, StoreConfig,
    },
    sources::{EnvConfig, FileConfig},
    validation::{self, ConfigGuardRailError, ConfigWarnings},
};

const DEFAULT_CONFIG_LOCATIONS: &[&str] = &["beacon.toml", "config/beacon.toml"];

const DEFAULT_PORT: u16 = 50052;
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);
const DEFAULT_MAX_MESSAGES: usize = 10;
const DEFAULT_WAIT_TIME: Duration = Duration::from_secs(5);
const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(1);
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

/// Composes configuration from `.env`, an optional TOML file and the
/// process environment. Environment values win over file values; defaults
/// fill whatever neither provides.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

/// Loaded configuration together with the warnings raised while composing it.
#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true).or_else(
                |err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                },
            )?,
            None => {
                dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                })?
            }
        };

        let mut load = self.load_with_env(EnvConfig::gather())?;
        load.config.metadata.env_file_loaded = env_file_loaded;
        Ok(load)
    }

    /// Like [`ConfigLoader::load`] but takes environment values from `env`
    /// instead of the process, and skips `.env` handling.
    pub fn load_with_env(
        &self,
        env: EnvConfig,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let (file_config, config_path) = self.load_file_config(&env)?;
        let (config, warnings) = compose_config(file_config, env, config_path)?;
        Ok(ConfigLoad { config, warnings })
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let explicit = self
            .options
            .config_path
            .clone()
            .or_else(|| env.config_path.clone());

        let path = match explicit {
            Some(path) if !path.exists() => {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            Some(path) => path,
            None => match DEFAULT_CONFIG_LOCATIONS
                .iter()
                .map(PathBuf::from)
                .find(|candidate| candidate.exists())
            {
                Some(path) => path,
                None => return Ok((None, None)),
            },
        };

        let contents =
            fs::read_to_string(&path).map_err(|source| ConfigLoadError::Io {
                path: path.clone(),
                source,
            })?;
        let file_config: FileConfig =
            toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse {
                path: path.clone(),
                source,
            })?;

        Ok((Some(file_config), Some(path)))
    }
}

fn compose_config(
    file_config: Option<FileConfig>,
    env: EnvConfig,
    config_path: Option<PathBuf>,
) -> Result<(Config, ConfigWarnings), ConfigLoadError> {
    let mut warnings = ConfigWarnings::default();

    if config_path.is_none() {
        warnings.push_with_hint(
            "No beacon.toml detected; using environment variables and defaults",
            "Create beacon.toml or set BEACON_CONFIG to point at one",
        );
    }

    let FileConfig {
        server: file_server,
        database: file_database,
        store: file_store,
        queue: file_queue,
        consumer: file_consumer,
        calls: file_calls,
    } = file_config.unwrap_or_default();

    let server = ServerConfig {
        host: env
            .server_host
            .or(file_server.host)
            .unwrap_or_else(|| "0.0.0.0".to_string()),
        port: number_setting("SERVER_PORT", env.server_port)?
            .or(file_server.port)
            .unwrap_or(DEFAULT_PORT),
    };

    let database = DatabaseConfig {
        url: env
            .database_url
            .or(file_database.url)
            .filter(|url| !url.trim().is_empty()),
        max_connections: number_setting(
            "DATABASE_MAX_CONNECTIONS",
            env.database_max_connections,
        )?
        .or(file_database.max_connections)
            .unwrap_or(DEFAULT_MAX_CONNECTIONS),
    };

    let store = StoreConfig {
        table: env
            .incident_table
            .or(file_store.table)
            .unwrap_or_else(|| DEFAULT_INCIDENT_TABLE.to_string()),
    };

    let queue = QueueConfig {
        name: env
            .queue_name
            .or(file_queue.name)
            .unwrap_or_else(|| DEFAULT_QUEUE_NAME.to_string()),
        poll_interval: duration_setting(
            "queue.poll_interval",
            env.queue_poll_interval.or(file_queue.poll_interval),
            DEFAULT_POLL_INTERVAL,
        )?,
    };

    let consumer = ConsumerSettings {
        max_messages: number_setting(
            "BEACON_CONSUMER_MAX_MESSAGES",
            env.consumer_max_messages,
        )?
        .or(file_consumer.max_messages)
            .unwrap_or(DEFAULT_MAX_MESSAGES),
        wait_time: duration_setting(
            "consumer.wait_time",
            env.consumer_wait_time.or(file_consumer.wait_time),
            DEFAULT_WAIT_TIME,
        )?,
        visibility_timeout: duration_setting(
            "consumer.visibility_timeout",
            env.consumer_visibility_timeout
                .or(file_consumer.visibility_timeout),
            DEFAULT_VISIBILITY_TIMEOUT,
        )?,
        max_receive_count: number_setting(
            "BEACON_CONSUMER_MAX_RECEIVE_COUNT",
            env.consumer_max_receive_count,
        )?
        .or(file_consumer.max_receive_count),
        error_backoff: duration_setting(
            "consumer.error_backoff",
            env.consumer_error_backoff.or(file_consumer.error_backoff),
            DEFAULT_ERROR_BACKOFF,
        )?,
    };

    let calls = CallsConfig {
        timeout: duration_setting(
            "calls.timeout",
            env.call_timeout.or(file_calls.timeout),
            DEFAULT_CALL_TIMEOUT,
        )?,
    };

    let config = Config {
        server,
        database,
        store,
        queue,
        consumer,
        calls,
        metadata: ConfigMetadata {
            config_path,
            env_file_loaded: false,
        },
    };

    warnings.extend(validation::apply_guard_rails(&config)?);
    Ok((config, warnings))
}

fn duration_setting(
    key: &'static str,
    raw: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigLoadError> {
    match raw {
        None => Ok(default),
        Some(value) => humantime::parse_duration(value.trim()).map_err(|source| {
            ConfigLoadError::InvalidDuration { key, value, source }
        }),
    }
}

fn number_setting<T>(
    key: &'static str,
    raw: Option<String>,
) -> Result<Option<T>, ConfigLoadError>
where
    T: FromStr<Err = ParseIntError>,
{
    raw.map(|value| {
        value
            .trim()
            .parse()
            .map_err(|source| ConfigLoadError::InvalidNumber { key, value, source })
    })
    .transpose()
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid duration {value:?} for {key}")]
    InvalidDuration {
        key: &'static str,
        value: String,
        #[source]
        source: humantime::DurationError,
    },
    #[error("invalid number {value:?} for {key}")]
    InvalidNumber {
        key: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error(transparent)]
    GuardRail(#[from] ConfigGuardRailError),
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}

impl ConfigLoadError {
    /// Path of the configuration file involved, when there is one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigLoadError::MissingConfig { path }
            | ConfigLoadError::Io { path, .. }
            | ConfigLoadError::Parse { path, .. } => Some(path),
            _ => None,
        }
    }
}
