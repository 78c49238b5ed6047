//! Runtime error types.

use stratum_core::OverlayError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The store could not be read or decoded.
    #[error("Overlay error: {0}")]
    Overlay(#[from] OverlayError),

    /// The store client could not be created.
    #[error("Failed to create store client: {0}")]
    StoreClient(String),

    /// Monitoring was requested outside a tokio runtime.
    #[error("No tokio runtime available to spawn the monitor")]
    NoAsyncRuntime,
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
