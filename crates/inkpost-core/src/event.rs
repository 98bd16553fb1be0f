//! Push-channel wire events, inbound and outbound.

use serde::{Deserialize, Serialize};

use crate::ids::{MessageId, SessionId, TaskId};
use crate::job::TransformOptions;
use crate::{CoreError, TaskKind};

/// Identifiers an inbound event may carry to name its task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EventTarget {
    /// Explicit task identifier, present for streaming transforms.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    /// Chat session identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

impl EventTarget {
    /// Target an event at a task id.
    pub fn task(id: impl Into<TaskId>) -> Self {
        Self {
            task_id: Some(id.into()),
            session_id: None,
        }
    }

    /// Target an event at a chat session.
    pub fn session(id: impl Into<SessionId>) -> Self {
        Self {
            task_id: None,
            session_id: Some(id.into()),
        }
    }

    /// Builder method to add a session id next to the task id.
    pub fn with_session(mut self, id: impl Into<SessionId>) -> Self {
        self.session_id = Some(id.into());
        self
    }
}

/// A piece of streamed output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkEvent {
    #[serde(flatten)]
    pub target: EventTarget,
    /// Text to append.
    pub chunk: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
}

/// End of a task's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoneEvent {
    #[serde(flatten)]
    pub target: EventTarget,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
    /// Set when the server replays a terminal event after a reconnect.
    #[serde(default)]
    pub cached: bool,
}

/// Server-side failure of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    #[serde(flatten)]
    pub target: EventTarget,
    /// Server-supplied message.
    pub error: String,
}

/// Inbound push-channel event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Chunk(ChunkEvent),
    Done(DoneEvent),
    Error(ErrorEvent),
}

impl StreamEvent {
    /// Create a chunk event.
    pub fn chunk(target: EventTarget, text: impl Into<String>) -> Self {
        Self::Chunk(ChunkEvent {
            target,
            chunk: text.into(),
            message_id: None,
        })
    }

    /// Create a done event.
    pub fn done(target: EventTarget, cached: bool) -> Self {
        Self::Done(DoneEvent {
            target,
            message_id: None,
            cached,
        })
    }

    /// Create an error event.
    pub fn error(target: EventTarget, error: impl Into<String>) -> Self {
        Self::Error(ErrorEvent {
            target,
            error: error.into(),
        })
    }

    /// Parse a raw JSON frame.
    pub fn from_json(frame: &str) -> Result<Self, CoreError> {
        Ok(serde_json::from_str(frame)?)
    }

    /// Identifiers carried by this event.
    pub fn target(&self) -> &EventTarget {
        match self {
            Self::Chunk(e) => &e.target,
            Self::Done(e) => &e.target,
            Self::Error(e) => &e.target,
        }
    }

    /// Short name for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Chunk(_) => "chunk",
            Self::Done(_) => "done",
            Self::Error(_) => "error",
        }
    }
}

/// Request sent over the push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundRequest {
    /// A chat message; replies are correlated by session id.
    #[serde(rename_all = "camelCase")]
    Chat { session_id: SessionId, text: String },

    /// A streaming text transform; replies are correlated by task id.
    #[serde(rename_all = "camelCase")]
    Transform {
        kind: TaskKind,
        task_id: TaskId,
        text: String,
        #[serde(default)]
        options: TransformOptions,
    },
}

impl OutboundRequest {
    /// Kind of task this request starts.
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::Chat { .. } => TaskKind::Chat,
            Self::Transform { kind, .. } => *kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chunk_with_task_id() {
        let event = StreamEvent::from_json(
            r#"{"type":"chunk","taskId":"t1","sessionId":"s1","chunk":"He","messageId":"m1"}"#,
        )
        .unwrap();

        match event {
            StreamEvent::Chunk(chunk) => {
                assert_eq!(chunk.target.task_id, Some(TaskId::new("t1")));
                assert_eq!(chunk.target.session_id, Some(SessionId::new("s1")));
                assert_eq!(chunk.chunk, "He");
                assert_eq!(chunk.message_id, Some(MessageId::new("m1")));
            }
            other => panic!("expected chunk, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_done_defaults_cached_to_false() {
        let event = StreamEvent::from_json(r#"{"type":"done","sessionId":"s1"}"#).unwrap();
        assert_eq!(event, StreamEvent::done(EventTarget::session("s1"), false));

        let cached =
            StreamEvent::from_json(r#"{"type":"done","taskId":"t1","cached":true}"#).unwrap();
        assert_eq!(cached, StreamEvent::done(EventTarget::task("t1"), true));
    }

    #[test]
    fn test_parse_error_without_ids() {
        let event = StreamEvent::from_json(r#"{"type":"error","error":"quota"}"#).unwrap();
        assert_eq!(event.target(), &EventTarget::default());
        assert_eq!(event.type_name(), "error");
    }

    #[test]
    fn test_unknown_event_type_is_rejected() {
        let err = StreamEvent::from_json(r#"{"type":"progress","taskId":"t1"}"#).unwrap_err();
        assert!(matches!(err, CoreError::Serialization(_)));
    }

    #[test]
    fn test_transform_request_wire_shape() {
        let request = OutboundRequest::Transform {
            kind: TaskKind::Translate,
            task_id: TaskId::new("t9"),
            text: "hola".to_string(),
            options: TransformOptions::default().with_language("en"),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["type"], "transform");
        assert_eq!(value["kind"], "translate");
        assert_eq!(value["taskId"], "t9");
        assert_eq!(value["options"]["targetLanguage"], "en");
        assert_eq!(request.kind(), TaskKind::Translate);
    }
}
