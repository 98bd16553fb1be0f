//! Inkpost Core Domain Types
//!
//! This crate contains the pure domain types of the AI assistant layer with
//! no dependencies on:
//! - Network/HTTP
//! - Async runtimes
//! - Timers
//!
//! Everything here describes tasks, their wire events and the discrete-job
//! contract. The coordination logic lives in `inkpost-assist`.

pub mod error;
pub mod event;
pub mod ids;
pub mod job;
pub mod kind;
pub mod status;
pub mod task;

// Re-export commonly used types
pub use error::CoreError;
pub use event::{ChunkEvent, DoneEvent, ErrorEvent, EventTarget, OutboundRequest, StreamEvent};
pub use ids::{CorrelationId, MessageId, OutboundId, SessionId, TaskId};
pub use job::{BatchItem, JobOutput, JobStatus, JobSubmission, JobSubmitted, TransformOptions};
pub use kind::TaskKind;
pub use status::{ConnectionState, JobState, OutboundState, TaskState};
pub use task::Task;
