//! Configuration management for MediaSweep
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use mediasweep::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Scanning {} collections", config.collections.len());
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `MEDIASWEEP__<section>__<key>`
//!
//! Examples:
//! - `MEDIASWEEP__VALIDATOR__TIMEOUT=10s`
//! - `MEDIASWEEP__REPAIR__BASE_URL=https://cdn.example.com/`
//! - `MEDIASWEEP__VALIDATOR__IGNORE_KEYWORDS=localhost:9199,emulator`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/mediasweep.toml`.
//! This can be overridden using the `MEDIASWEEP_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::HumanDuration;
pub use models::{
    CollectionConfig, Config, PlaceholderConfig, RepairConfig, SchedulerConfig, ServerConfig,
    StorageConfig, UnvalidatablePolicy, ValidatorConfig, WorkerConfig,
};
pub use validation::{MAX_WRITE_BATCH, ValidationError};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`MEDIASWEEP__*`)
    /// 2. TOML file (default: `config/mediasweep.toml`)
    /// 3. Default values
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate(self)
    }
}
