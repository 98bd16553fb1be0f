//! Newtype wrappers for identifiers to ensure type safety.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new id from a string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generate a new random id.
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Get the inner string reference.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner string.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_id!(
    /// Identifier of one AI task, assigned by the client for streaming
    /// transforms and by the server for discrete jobs.
    TaskId
);

string_id!(
    /// Identifier of a chat session.
    SessionId
);

string_id!(
    /// Per-message identifier the server may attach to chunk/done events.
    MessageId
);

string_id!(
    /// Identifier the outbound queue assigns to each enqueued request.
    OutboundId
);

string_id!(
    /// Key used to route an inbound event to its task.
    ///
    /// Holds a task id when the event carries one, otherwise the session id.
    CorrelationId
);

impl From<TaskId> for CorrelationId {
    fn from(id: TaskId) -> Self {
        Self(id.into_inner())
    }
}

impl From<&TaskId> for CorrelationId {
    fn from(id: &TaskId) -> Self {
        Self(id.as_str().to_owned())
    }
}

impl From<SessionId> for CorrelationId {
    fn from(id: SessionId) -> Self {
        Self(id.into_inner())
    }
}

impl From<&SessionId> for CorrelationId {
    fn from(id: &SessionId) -> Self {
        Self(id.as_str().to_owned())
    }
}
