//! AI task coordination for Inkpost
//!
//! This crate tracks AI generation tasks from request to terminal outcome:
//! streamed chat and text transforms arriving over a push channel, and
//! discrete jobs polled over HTTP. It retries outbound sends across
//! disconnects and makes duplicate or late events inert.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use inkpost_assist::{AssistConfig, Assistant, HttpJobClient, StreamTransport};
//! use inkpost_core::{SessionId, TaskKind, TransformOptions};
//!
//! async fn run(transport: Arc<dyn StreamTransport>) -> Result<(), Box<dyn std::error::Error>> {
//!     let jobs = Arc::new(HttpJobClient::new("http://localhost:3000"));
//!     let assistant = Assistant::new(AssistConfig::default(), transport, jobs);
//!
//!     let reply = assistant.chat(SessionId::new("s1"), "Hello").await?;
//!     println!("{}", reply.await?);
//!
//!     let outline = assistant
//!         .submit_job(TaskKind::Outline, "My draft", TransformOptions::default())
//!         .await?;
//!     println!("{}", outline.await?.into_text());
//!     Ok(())
//! }
//! ```

mod assistant;
mod completion;
mod config;
mod connection;
mod dedup;
mod error;
mod http;
mod outbound;
mod polling;
mod registry;
pub mod router;
mod transport;

#[cfg(test)]
mod testing;

// Re-export main types
pub use assistant::{Assistant, JobHandle, TaskHandle};
pub use completion::{Completion, ErrorSink, Outcome, ResultSink};
pub use config::{AssistConfig, DedupConfig, PollConfig, RetryConfig};
pub use connection::TransportState;
pub use dedup::DedupGuard;
pub use error::AssistError;
pub use http::HttpJobClient;
pub use outbound::{FailureSink, OutboundMessage, OutboundQueue};
pub use polling::{PollOptions, PollProgress, PollingCoordinator};
pub use registry::{EventOutcome, IgnoreReason, TaskRegistry, TaskUpdate};
pub use transport::{JobClient, StreamTransport};
