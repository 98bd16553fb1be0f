//! Kinds of AI generation work.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::CoreError;

/// What an AI task produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Conversational reply in a chat session.
    Chat,
    /// Fix grammar and flow without changing meaning.
    Polish,
    /// Rewrite for clarity and impact.
    Improve,
    /// Elaborate on the given text.
    Expand,
    /// Condense the given text.
    Summarize,
    /// Translate into another language.
    Translate,
    /// Produce an article outline.
    Outline,
    /// Run several transforms in one job.
    Batch,
}

impl TaskKind {
    /// All kinds, in declaration order.
    pub const ALL: [TaskKind; 8] = [
        Self::Chat,
        Self::Polish,
        Self::Improve,
        Self::Expand,
        Self::Summarize,
        Self::Translate,
        Self::Outline,
        Self::Batch,
    ];

    /// Wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Polish => "polish",
            Self::Improve => "improve",
            Self::Expand => "expand",
            Self::Summarize => "summarize",
            Self::Translate => "translate",
            Self::Outline => "outline",
            Self::Batch => "batch",
        }
    }

    /// Returns true if results for this kind arrive over the push channel.
    pub fn supports_streaming(&self) -> bool {
        matches!(
            self,
            Self::Chat
                | Self::Polish
                | Self::Improve
                | Self::Expand
                | Self::Summarize
                | Self::Translate
        )
    }

    /// Returns true if this kind can be submitted as a discrete, polled job.
    pub fn supports_polling(&self) -> bool {
        !matches!(self, Self::Chat)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::InvalidInput(format!("unknown task kind '{}'", s)))
    }
}
