//! Unified error types for the gridpart crates.
//!
//! This module provides a common error type [`GridError`] shared by the
//! topology, partition-state, and environment layers. Recoverable data
//! anomalies (non-finite embeddings, malformed attention tensors) are
//! *not* represented here; those degrade in place and are reported
//! through the diagnostic log instead.

use thiserror::Error;

/// Unified error type for gridpart operations.
#[derive(Error, Debug)]
pub enum GridError {
    /// Topology construction or lookup errors
    #[error("Topology error: {0}")]
    Topology(String),

    /// Partition initialization errors
    #[error("Initialization error: {0}")]
    Init(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using GridError.
pub type GridResult<T> = Result<T, GridError>;

impl From<anyhow::Error> for GridError {
    fn from(err: anyhow::Error) -> Self {
        GridError::Other(err.to_string())
    }
}

impl From<String> for GridError {
    fn from(s: String) -> Self {
        GridError::Other(s)
    }
}

impl From<&str> for GridError {
    fn from(s: &str) -> Self {
        GridError::Other(s.to_string())
    }
}
