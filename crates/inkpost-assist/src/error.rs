//! Error types for the assistant layer.

use std::time::Duration;

use thiserror::Error;

use inkpost_core::{CoreError, CorrelationId};

/// Errors surfaced by the coordination layer.
///
/// Only terminal failures reach a caller's error sink. Retryable failures
/// (`Transport`, `Http`, `HttpStatus`) are absorbed by the outbound queue and
/// the polling coordinator until their ceilings are exhausted.
#[derive(Debug, Error)]
pub enum AssistError {
    /// Push channel unavailable or a send failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server reported the task or job as failed.
    #[error("server task error: {0}")]
    ServerTask(String),

    /// Retry or poll ceiling exhausted without a terminal server response.
    #[error("{operation} timed out after {attempts} attempts")]
    ClientTimeout {
        operation: &'static str,
        attempts: u32,
    },

    /// A streaming task went quiet for longer than the idle timeout.
    #[error("no stream events for {0:?}")]
    StreamIdle(Duration),

    /// The caller abandoned the task.
    #[error("task cancelled")]
    Cancelled,

    /// A task with this id is registered and not terminal.
    #[error("task already active: {0}")]
    TaskAlreadyActive(CorrelationId),

    /// The background loop owning task state has stopped.
    #[error("assistant is shut down")]
    ShutDown,

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status.
    #[error("HTTP {status}: {path}")]
    HttpStatus { status: u16, path: String },

    /// Domain error (invalid input, unexpected result shape, ...).
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl AssistError {
    /// Returns true if retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Http(_) => true,
            Self::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
