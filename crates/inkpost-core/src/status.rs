//! Status enums for tasks, outbound messages, jobs and the push channel.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a streamed AI task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Task registered, no chunk received yet.
    #[default]
    Pending,
    /// At least one chunk received.
    Streaming,
    /// Task finished successfully.
    Completed,
    /// Task failed (server error, send ceiling or idle timeout).
    Failed,
    /// Task was abandoned by the caller.
    Cancelled,
}

impl TaskState {
    /// Returns true if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true if moving to `next` keeps the lifecycle one-way.
    ///
    /// Staying in `Streaming` is allowed so every chunk can be applied through
    /// the same transition check.
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        match self {
            Self::Pending => next != Self::Pending,
            Self::Streaming => next != Self::Pending,
            Self::Completed | Self::Failed | Self::Cancelled => false,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// State of a request held by the outbound queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundState {
    /// Waiting to be sent (first attempt or a scheduled retry).
    #[default]
    Queued,
    /// Handed to the transport, awaiting the send result.
    Sending,
    /// Accepted by the transport.
    Sent,
    /// Retry ceiling exhausted.
    Failed,
    /// Withdrawn before it reached the transport.
    Cancelled,
}

impl OutboundState {
    /// Returns true if the message still counts towards the pending depth.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Queued | Self::Sending)
    }
}

/// Connectivity of the push channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    /// No channel.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Channel is up and accepting sends.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// Status of a discrete job as reported by the job-status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Accepted, not started.
    Pending,
    /// Running on the server.
    Processing,
    /// Finished; the status carries a result.
    Completed,
    /// Finished with an error message.
    Failed,
}

impl JobState {
    /// Returns true if polling should stop.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}
