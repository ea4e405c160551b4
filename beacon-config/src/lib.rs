//! Configuration for Beacon.
//!
//! Both binaries load their settings through [`ConfigLoader`], so defaults,
//! environment variable names and validation rules live in one place.
#![allow(missing_docs)]

pub mod loader;
pub mod models;
pub mod sources;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, ConfigLoaderOptions};
pub use models::{
    CallsConfig, Config, ConfigMetadata, ConsumerSettings, DatabaseConfig,
    QueueConfig, ServerConfig, StoreConfig,
};
pub use sources::{EnvConfig, FileConfig};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};
