//! Routing of inbound push-channel events to tasks.

use tracing::{trace, warn};

use inkpost_core::{CorrelationId, EventTarget, StreamEvent};

use crate::error::AssistError;
use crate::registry::{EventOutcome, IgnoreReason, TaskRegistry};

/// Pick the id an event is routed by: the task id when present, otherwise
/// the session id.
///
/// This is the only place the task-id/session-id fallback is decided.
pub fn resolve_correlation_id(target: &EventTarget) -> Option<CorrelationId> {
    target
        .task_id
        .as_ref()
        .map(CorrelationId::from)
        .or_else(|| target.session_id.as_ref().map(CorrelationId::from))
}

/// Deliver one event to the registry.
pub fn route(registry: &mut TaskRegistry, event: StreamEvent) -> EventOutcome {
    let Some(id) = resolve_correlation_id(event.target()) else {
        warn!(event = event.type_name(), "Event without task or session id dropped");
        return EventOutcome::Ignored(IgnoreReason::NoCorrelationId);
    };
    trace!(task_id = %id, event = event.type_name(), "Routing event");

    match event {
        StreamEvent::Chunk(chunk) => registry.on_chunk(&id, &chunk.chunk, chunk.message_id),
        StreamEvent::Done(done) => registry.on_done(&id, done.cached, done.message_id),
        StreamEvent::Error(error) => {
            registry.on_error(&id, AssistError::ServerTask(error.error))
        }
    }
}

/// Parse a raw JSON frame and deliver it.
pub fn route_frame(registry: &mut TaskRegistry, frame: &str) -> Result<EventOutcome, AssistError> {
    let event = StreamEvent::from_json(frame)?;
    Ok(route(registry, event))
}
