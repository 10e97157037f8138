//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Build every pipeline component in dependency order
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal, nothing is bound
//! - Components initialize in order, not concurrently

use std::path::Path;

use thiserror::Error;

use crate::config::{load_config, validate_config, ConfigError, PipelineConfig};
use crate::filter::ChainError;
use crate::lifecycle::listener::ListenerError;
use crate::serialization::SerializeError;

/// Any error that prevents the pipeline from accepting requests.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("filter chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("serializer error: {0}")]
    Serializer(#[from] SerializeError),

    #[error("context listener error: {0}")]
    Listener(#[from] ListenerError),
}

/// Load the config file if given, otherwise validate the defaults.
pub fn load(path: Option<&Path>) -> Result<PipelineConfig, StartupError> {
    match path {
        Some(path) => Ok(load_config(path)?),
        None => {
            let config = PipelineConfig::default();
            validate_config(&config).map_err(ConfigError::Validation)?;
            Ok(config)
        }
    }
}
