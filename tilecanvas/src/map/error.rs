//! Map lifecycle errors.

use thiserror::Error;

use super::config::ConfigError;
use crate::collector::CollectorError;

/// Errors raised by [`MapState`](super::MapState).
#[derive(Debug, Error)]
pub enum MapError {
    /// The configuration was rejected.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// No tokio runtime to run on, or the worker pool could not be created.
    #[error("Failed to start runtime: {0}")]
    Runtime(String),

    /// The map was shut down.
    #[error("Map is shut down")]
    ShutDown,
}

impl From<CollectorError> for MapError {
    fn from(e: CollectorError) -> Self {
        match e {
            CollectorError::ShutDown => MapError::ShutDown,
            CollectorError::NoWorkers => MapError::Config(ConfigError::NoWorkers),
            CollectorError::Runtime(e) => MapError::Runtime(e.to_string()),
        }
    }
}
