//! Core domain errors.

use thiserror::Error;

use crate::TaskKind;

/// Core domain errors for the assistant layer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// Invalid state transition.
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A completed job carried a result that does not match its kind.
    #[error("Unexpected result shape for '{kind}' job: {reason}")]
    UnexpectedResultShape { kind: TaskKind, reason: String },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
