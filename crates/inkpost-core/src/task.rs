//! Streamed task state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CoreError, CorrelationId, MessageId, TaskKind, TaskState};

/// One logical AI generation request and its lifecycle state.
///
/// The caller's result/error sinks are not part of this type; the registry
/// owns them next to the task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Key inbound events are routed by.
    pub id: CorrelationId,

    /// What the task produces.
    pub kind: TaskKind,

    /// Current lifecycle state.
    pub state: TaskState,

    /// Ordered concatenation of received chunks.
    pub accumulated_text: String,

    /// Last per-message identifier seen on a chunk or done event.
    pub message_id: Option<MessageId>,

    /// When the task was registered.
    pub created_at: DateTime<Utc>,

    /// When the task last received an event (or was created).
    pub last_event_at: DateTime<Utc>,
}

impl Task {
    /// Create a new Task in `Pending`.
    pub fn new(id: impl Into<CorrelationId>, kind: TaskKind) -> Self {
        Self::new_at(id, kind, Utc::now())
    }

    /// Create a new Task with an explicit creation time.
    pub fn new_at(id: impl Into<CorrelationId>, kind: TaskKind, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            kind,
            state: TaskState::Pending,
            accumulated_text: String::new(),
            message_id: None,
            created_at: now,
            last_event_at: now,
        }
    }

    /// Check if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Append a streamed chunk, moving `Pending` to `Streaming`.
    pub fn append_chunk(
        &mut self,
        text: &str,
        message_id: Option<MessageId>,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        self.transition(TaskState::Streaming)?;
        self.accumulated_text.push_str(text);
        if message_id.is_some() {
            self.message_id = message_id;
        }
        self.last_event_at = now;
        Ok(())
    }

    /// Mark the task as completed.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), CoreError> {
        self.transition(TaskState::Completed)?;
        self.last_event_at = now;
        Ok(())
    }

    /// Mark the task as failed.
    pub fn fail(&mut self, now: DateTime<Utc>) -> Result<(), CoreError> {
        self.transition(TaskState::Failed)?;
        self.last_event_at = now;
        Ok(())
    }

    /// Mark the task as cancelled.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), CoreError> {
        self.transition(TaskState::Cancelled)?;
        self.last_event_at = now;
        Ok(())
    }

    /// Returns true if no event arrived for longer than `idle`.
    pub fn is_stale(&self, now: DateTime<Utc>, idle: chrono::Duration) -> bool {
        !self.is_terminal() && now - self.last_event_at > idle
    }

    fn transition(&mut self, next: TaskState) -> Result<(), CoreError> {
        if !self.state.can_transition_to(next) {
            return Err(CoreError::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        Ok(())
    }
}
