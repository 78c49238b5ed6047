//! Configuration module for the Stratum runtime.
//!
//! This module provides layered configuration loading and validation for the
//! base attribute layer, store connection, refresh and logging settings.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    LogFormat, LogLevel, LogOutput, LoggingConfig, MonitorConfig, SelectorConfig, StoreConfig,
    StratumConfig,
};
pub use validation::validate_config;
