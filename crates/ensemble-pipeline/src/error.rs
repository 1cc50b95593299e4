//! Error types for the pipeline engine.

use ensemble_types::{PipelineId, UnitInstanceId};
use thiserror::Error;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while building, registering or running pipelines.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    /// Unknown capability identifier.
    #[error("Capability not found: {0}")]
    CapabilityNotFound(String),

    /// Unknown catalog pipeline name.
    #[error("Pipeline not found: {0}")]
    PipelineNotFound(String),

    /// A unit that already belongs to a pipeline was attached to another.
    #[error("Unit '{unit}' ({instance}) is already owned by pipeline {owner}")]
    OwnershipConflict {
        unit: String,
        instance: UnitInstanceId,
        owner: PipelineId,
    },

    /// A unit constructor failed.
    #[error("Failed to construct capability '{capability}': {message}")]
    Construction { capability: String, message: String },

    /// Structurally invalid pipeline.
    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),

    /// A declarative definition is unusable.
    #[error("Invalid pipeline definition '{name}': {message}")]
    InvalidDefinition { name: String, message: String },

    /// Definition source could not be parsed.
    #[error("Failed to parse pipeline definitions: {0}")]
    Parse(String),

    /// A member failed during execution.
    #[error("Member '{member}' of pipeline '{pipeline}' failed: {message}")]
    BranchFailed {
        pipeline: String,
        member: String,
        message: String,
    },

    /// The run was cancelled.
    #[error("Execution cancelled")]
    Cancelled,

    /// A category registration routine failed.
    #[error("Registration of category '{category}' failed: {message}")]
    Registration { category: String, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn construction(capability: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Construction {
            capability: capability.into(),
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidPipeline(message.into())
    }

    pub fn definition(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Whether this is one of the not-found errors callers recover from locally.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::CapabilityNotFound(_) | Self::PipelineNotFound(_)
        )
    }
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panicked: {msg}")
    } else {
        "panicked".to_string()
    }
}
