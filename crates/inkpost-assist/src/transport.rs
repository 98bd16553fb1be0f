//! Collaborator interfaces: the push channel and the job endpoint.

use async_trait::async_trait;

use inkpost_core::{CorrelationId, JobStatus, JobSubmission, OutboundRequest, TaskId};

use crate::error::AssistError;

/// Outbound side of the push channel.
///
/// Inbound events do not go through this trait; the transport hands them to
/// [`crate::Assistant::handle_event`] or [`crate::Assistant::handle_frame`] and
/// reports connectivity through [`crate::TransportState`].
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Send a chat message or streaming transform.
    ///
    /// `Ok` means the channel accepted the frame, not that the task finished.
    async fn send(&self, request: &OutboundRequest) -> Result<(), AssistError>;

    /// Ask the server to stop producing events for `id`. Best effort.
    async fn cancel(&self, id: &CorrelationId) -> Result<(), AssistError>;
}

/// Request/response side for discrete jobs.
#[async_trait]
pub trait JobClient: Send + Sync {
    /// Submit a job and return the server-assigned task id.
    async fn submit(&self, submission: &JobSubmission) -> Result<TaskId, AssistError>;

    /// Fetch the current status of a job.
    async fn status(&self, task_id: &TaskId) -> Result<JobStatus, AssistError>;
}
