//! Layered configuration for the compliance engine.
//!
//! Settings are loaded from, in increasing priority:
//! 1. Default values (embedded in struct `Default` impls)
//! 2. A TOML configuration file
//! 3. Environment variables, prefixed `COMPLIANCE_ENGINE__`
//!
//! # Usage
//!
//! ```no_run
//! use compliance_engine::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! - `COMPLIANCE_ENGINE__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `COMPLIANCE_ENGINE__PIPELINE__COMPLIANCE_REGENERATION_THRESHOLD=90`
//!
//! # Configuration File
//!
//! By default, configuration is loaded from `config/compliance-engine.toml`.
//! This can be overridden via the `COMPLIANCE_ENGINE_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use models::{
    Config, DegradationConfig, ForceNewConfig, IdempotencyConfig, PipelineConfig,
    ProviderConfig, ProviderEndpoint, QuotaConfig, ServerConfig, ValidationConfig, WorkerConfig,
};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment).
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file is malformed or a
    /// cross-field invariant fails (see [`validation::validate`]).
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path. Useful for tests.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}
