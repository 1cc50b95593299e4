//! Domain error types.

use thiserror::Error;

/// Domain-level errors.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Pipeline composition, registry or execution error.
    #[error(transparent)]
    Pipeline(#[from] ensemble_pipeline::PipelineError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ensemble_config::ConfigError),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Pipeline(err) if err.is_not_found())
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
