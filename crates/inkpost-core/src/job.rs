//! Discrete-job contract: submission, status and per-kind result shapes.
//!
//! A completed job's `result` field is shaped differently per kind. Each kind
//! has exactly one unwrap step, performed by [`JobOutput::from_result`]:
//!
//! | Kind | `result` | Unwrap |
//! |------|----------|--------|
//! | polish, improve, expand, summarize, translate | `{"result": "<text>"}` | `result.result` |
//! | outline | `"<text>"` | `result` |
//! | batch | `{"results": [{"result"?, "error"?}]}` | `result.results` |
//!
//! Chat never runs as a discrete job.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{CoreError, JobState, TaskId, TaskKind};

/// Optional knobs for a transform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransformOptions {
    /// Target language for `translate`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_language: Option<String>,

    /// Desired tone, e.g. "formal".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,

    /// Transforms to run for a `batch` job.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub operations: Vec<TaskKind>,
}

impl TransformOptions {
    /// Builder method to set the target language.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.target_language = Some(language.into());
        self
    }

    /// Builder method to set the tone.
    pub fn with_tone(mut self, tone: impl Into<String>) -> Self {
        self.tone = Some(tone.into());
        self
    }

    /// Builder method to add a batch operation.
    pub fn with_operation(mut self, kind: TaskKind) -> Self {
        self.operations.push(kind);
        self
    }
}

/// Body of a job submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSubmission {
    pub kind: TaskKind,
    pub text: String,
    #[serde(default)]
    pub options: TransformOptions,
}

impl JobSubmission {
    /// Create a submission, rejecting kinds that cannot be polled.
    pub fn new(
        kind: TaskKind,
        text: impl Into<String>,
        options: TransformOptions,
    ) -> Result<Self, CoreError> {
        if !kind.supports_polling() {
            return Err(CoreError::InvalidInput(format!(
                "'{}' cannot be submitted as a discrete job",
                kind
            )));
        }
        Ok(Self {
            kind,
            text: text.into(),
            options,
        })
    }
}

/// Response to a job submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSubmitted {
    pub task_id: TaskId,
}

/// Response of the job-status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub status: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobStatus {
    /// A status with no result or error.
    pub fn new(status: JobState) -> Self {
        Self {
            status,
            progress: None,
            result: None,
            error: None,
        }
    }

    /// Builder method to attach a result payload.
    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    /// Builder method to attach an error message.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// One entry of a batch result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Normalized result of a completed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum JobOutput {
    /// Rewritten text (polish, improve, expand, summarize, translate).
    Text(String),
    /// Outline text.
    Outline(String),
    /// Per-operation results of a batch job.
    Batch(Vec<BatchItem>),
}

#[derive(Deserialize)]
struct NestedText {
    result: String,
}

#[derive(Deserialize)]
struct BatchEnvelope {
    results: Vec<BatchItem>,
}

impl JobOutput {
    /// Unwrap a completed job's `result` according to its kind.
    pub fn from_result(kind: TaskKind, result: Option<Value>) -> Result<Self, CoreError> {
        let Some(result) = result else {
            return Err(CoreError::UnexpectedResultShape {
                kind,
                reason: "completed without a result".to_string(),
            });
        };

        let shape_error = |e: serde_json::Error| CoreError::UnexpectedResultShape {
            kind,
            reason: e.to_string(),
        };

        match kind {
            TaskKind::Polish
            | TaskKind::Improve
            | TaskKind::Expand
            | TaskKind::Summarize
            | TaskKind::Translate => {
                let nested: NestedText = serde_json::from_value(result).map_err(shape_error)?;
                Ok(Self::Text(nested.result))
            }
            TaskKind::Outline => {
                let outline: String = serde_json::from_value(result).map_err(shape_error)?;
                Ok(Self::Outline(outline))
            }
            TaskKind::Batch => {
                let envelope: BatchEnvelope =
                    serde_json::from_value(result).map_err(shape_error)?;
                Ok(Self::Batch(envelope.results))
            }
            TaskKind::Chat => Err(CoreError::InvalidInput(
                "chat does not produce job results".to_string(),
            )),
        }
    }

    /// Text of a single-result job.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) | Self::Outline(text) => Some(text),
            Self::Batch(_) => None,
        }
    }

    /// Flatten into display text; batch results are joined by blank lines,
    /// failed entries are skipped.
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) | Self::Outline(text) => text,
            Self::Batch(items) => items
                .into_iter()
                .filter_map(|item| item.result)
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }
}
