//! Per-task state machines for streamed AI tasks.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use inkpost_core::{CorrelationId, MessageId, OutboundId, Task, TaskKind};

use crate::completion::Completion;
use crate::dedup::DedupGuard;
use crate::error::AssistError;

/// What happened to an inbound event or local escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// The task changed state or accumulated text.
    Applied,
    /// Nothing changed.
    Ignored(IgnoreReason),
}

/// Why an event had no effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The id is finalized (completed, failed or cancelled).
    Finalized,
    /// No task is registered under the id.
    UnknownTask,
    /// The event carried neither a task id nor a session id.
    NoCorrelationId,
    /// The event belongs to the message this id carried before it was
    /// registered again.
    PreviousMessage,
}

/// Update published to UI subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskUpdate {
    Chunk { id: CorrelationId, text: String },
    Done { id: CorrelationId, text: String },
    Failed { id: CorrelationId, error: String },
    Cancelled { id: CorrelationId },
}

impl TaskUpdate {
    pub fn id(&self) -> &CorrelationId {
        match self {
            Self::Chunk { id, .. }
            | Self::Done { id, .. }
            | Self::Failed { id, .. }
            | Self::Cancelled { id } => id,
        }
    }
}

struct Entry {
    task: Task,
    /// Taken exactly once when the task becomes terminal.
    completion: Option<Completion<String>>,
    /// Request that started the task, while the outbound queue may hold it.
    outbound: Option<OutboundId>,
    /// The server may still stream for this task. Cleared by a server
    /// terminal event, a local failure, or when the request never left.
    in_flight: bool,
    /// Set when the id was registered again while the previous task was
    /// still in flight.
    drain: Option<Drain>,
}

/// Tail of the previous message on a re-registered id.
///
/// The server answers one message per session at a time, so everything up
/// to the previous message's terminal event precedes the new message.
/// Events are attributed to the previous message until that terminal event
/// arrives or an event carries a different message id.
#[derive(Debug)]
struct Drain {
    message_id: Option<MessageId>,
}

impl Entry {
    /// Returns true if the event belongs to the previous message and must
    /// be ignored.
    fn drains(&mut self, message_id: Option<&MessageId>, terminal: bool) -> bool {
        let Some(drain) = self.drain.as_mut() else {
            return false;
        };
        let previous = drain.message_id.clone();
        let newer = match (message_id, previous) {
            (Some(incoming), Some(previous)) => *incoming != previous,
            (Some(incoming), None) => {
                drain.message_id = Some(incoming.clone());
                false
            }
            (None, _) => false,
        };
        if newer || terminal {
            self.drain = None;
        }
        !newer
    }
}

/// Owns every streamed task, accumulates text, and resolves each task's
/// completion at most once.
///
/// Every mutating method first consults the [`DedupGuard`]; once an id is
/// guarded, events for it are ignored until the id is registered again.
pub struct TaskRegistry {
    tasks: HashMap<CorrelationId, Entry>,
    dedup: DedupGuard,
    updates: Option<broadcast::Sender<TaskUpdate>>,
}

impl TaskRegistry {
    pub fn new(dedup: DedupGuard) -> Self {
        Self {
            tasks: HashMap::new(),
            dedup,
            updates: None,
        }
    }

    /// Builder method to publish task updates on a broadcast channel.
    pub fn with_updates(mut self, updates: broadcast::Sender<TaskUpdate>) -> Self {
        self.updates = Some(updates);
        self
    }

    /// Register a task in `Pending`.
    ///
    /// Fails if `id` belongs to a task that is not terminal; the completion is
    /// dropped unresolved in that case. Registering an id whose previous task
    /// is terminal replaces that task and lifts the guard on the id.
    pub fn create(
        &mut self,
        id: CorrelationId,
        kind: TaskKind,
        completion: Completion<String>,
    ) -> Result<(), AssistError> {
        self.purge_expired();

        let drain = match self.tasks.get(&id) {
            Some(existing) if !existing.task.is_terminal() => {
                warn!(task_id = %id, state = %existing.task.state, "Task already active, ignoring create");
                return Err(AssistError::TaskAlreadyActive(id));
            }
            Some(existing) if existing.in_flight => Some(Drain {
                message_id: existing.task.message_id.clone(),
            }),
            _ => None,
        };

        if self.dedup.remove(&id) {
            debug!(
                task_id = %id,
                draining = drain.is_some(),
                "Re-arming finalized id for a new task"
            );
        }

        info!(task_id = %id, kind = %kind, "Task created");
        self.tasks.insert(
            id.clone(),
            Entry {
                task: Task::new(id, kind),
                completion: Some(completion),
                outbound: None,
                in_flight: true,
                drain,
            },
        );
        Ok(())
    }

    /// Record the outbound request that started the task.
    pub fn attach_outbound(&mut self, id: &CorrelationId, outbound: OutboundId) {
        if let Some(entry) = self.tasks.get_mut(id) {
            entry.outbound = Some(outbound);
        }
    }

    /// Outbound request that started the task, if any.
    pub fn outbound_of(&self, id: &CorrelationId) -> Option<&OutboundId> {
        self.tasks.get(id).and_then(|entry| entry.outbound.as_ref())
    }

    /// The task's request was withdrawn before reaching the server, so no
    /// event for it will follow.
    pub fn mark_unsent(&mut self, id: &CorrelationId) {
        if let Some(entry) = self.tasks.get_mut(id) {
            entry.in_flight = false;
            entry.outbound = None;
        }
    }

    /// Append streamed text.
    pub fn on_chunk(
        &mut self,
        id: &CorrelationId,
        text: &str,
        message_id: Option<MessageId>,
    ) -> EventOutcome {
        let entry = match self.live_entry(id, "chunk") {
            Ok(entry) => entry,
            Err(reason) => return EventOutcome::Ignored(reason),
        };
        if entry.drains(message_id.as_ref(), false) {
            debug!(task_id = %id, "Chunk of previous message ignored");
            return EventOutcome::Ignored(IgnoreReason::PreviousMessage);
        }

        if let Err(e) = entry.task.append_chunk(text, message_id, Utc::now()) {
            warn!(task_id = %id, error = %e, "Chunk rejected");
            return EventOutcome::Ignored(IgnoreReason::Finalized);
        }

        self.publish(TaskUpdate::Chunk {
            id: id.clone(),
            text: text.to_string(),
        });
        EventOutcome::Applied
    }

    /// Finalize with the accumulated text.
    ///
    /// A `cached` done is a server replay after reconnect; it finalizes with
    /// whatever text is already held, which may be empty.
    pub fn on_done(
        &mut self,
        id: &CorrelationId,
        cached: bool,
        message_id: Option<MessageId>,
    ) -> EventOutcome {
        let entry = match self.live_entry(id, "done") {
            Ok(entry) => entry,
            Err(reason) => return EventOutcome::Ignored(reason),
        };
        if entry.drains(message_id.as_ref(), true) {
            debug!(task_id = %id, cached, "Done of previous message ignored");
            return EventOutcome::Ignored(IgnoreReason::PreviousMessage);
        }

        if let Err(e) = entry.task.complete(Utc::now()) {
            warn!(task_id = %id, error = %e, "Done rejected");
            return EventOutcome::Ignored(IgnoreReason::Finalized);
        }
        if message_id.is_some() {
            entry.task.message_id = message_id;
        }
        entry.in_flight = false;

        let text = entry.task.accumulated_text.clone();
        let completion = entry.completion.take();
        info!(
            task_id = %id,
            cached,
            text_len = text.len(),
            "Task completed"
        );

        self.guard(id.clone());
        self.publish(TaskUpdate::Done {
            id: id.clone(),
            text: text.clone(),
        });
        if let Some(completion) = completion {
            completion.resolve(Ok(text));
        }
        EventOutcome::Applied
    }

    /// Fail the task with a server-reported error.
    pub fn on_error(&mut self, id: &CorrelationId, err: AssistError) -> EventOutcome {
        self.finalize_failed(id, err, "error", true)
    }

    /// Fail the task from a local escalation (send ceiling, idle timeout).
    pub fn fail(&mut self, id: &CorrelationId, err: AssistError) -> EventOutcome {
        self.finalize_failed(id, err, "local failure", false)
    }

    /// Abandon the task.
    ///
    /// The id is guarded before anything else, so events that arrive later
    /// are inert whether or not the server honours the cancellation. The
    /// completion is dropped unresolved. Unknown ids are guarded as well.
    pub fn cancel(&mut self, id: &CorrelationId) -> EventOutcome {
        self.purge_expired();

        if self.dedup.contains(id) {
            debug!(task_id = %id, "Cancel for finalized task ignored");
            return EventOutcome::Ignored(IgnoreReason::Finalized);
        }

        self.guard(id.clone());

        let Some(entry) = self.tasks.get_mut(id) else {
            debug!(task_id = %id, "Cancel for unknown task, id guarded");
            return EventOutcome::Ignored(IgnoreReason::UnknownTask);
        };

        if let Err(e) = entry.task.cancel(Utc::now()) {
            warn!(task_id = %id, error = %e, "Cancel rejected");
            return EventOutcome::Ignored(IgnoreReason::Finalized);
        }
        entry.completion = None;

        info!(task_id = %id, "Task cancelled");
        self.publish(TaskUpdate::Cancelled { id: id.clone() });
        EventOutcome::Applied
    }

    /// Fail every live task with no event for longer than `idle`.
    ///
    /// Returns the ids that were failed.
    pub fn expire_stale(&mut self, now: DateTime<Utc>, idle: Duration) -> Vec<CorrelationId> {
        let idle_chrono = chrono::Duration::from_std(idle).unwrap_or(chrono::Duration::MAX);
        let stale: Vec<CorrelationId> = self
            .tasks
            .iter()
            .filter(|(_, entry)| entry.task.is_stale(now, idle_chrono))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &stale {
            self.fail(id, AssistError::StreamIdle(idle));
        }
        stale
    }

    /// Look up a task, including terminal ones still guarded.
    pub fn get(&self, id: &CorrelationId) -> Option<&Task> {
        self.tasks.get(id).map(|entry| &entry.task)
    }

    /// Returns true if events for `id` are currently ignored.
    pub fn is_finalized(&self, id: &CorrelationId) -> bool {
        self.dedup.contains(id)
    }

    /// Number of tasks that are not terminal.
    pub fn active_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|entry| !entry.task.is_terminal())
            .count()
    }

    /// Number of tasks held, terminal ones included.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn finalize_failed(
        &mut self,
        id: &CorrelationId,
        err: AssistError,
        source: &'static str,
        from_server: bool,
    ) -> EventOutcome {
        let entry = match self.live_entry(id, source) {
            Ok(entry) => entry,
            Err(reason) => return EventOutcome::Ignored(reason),
        };
        if from_server && entry.drains(None, true) {
            debug!(task_id = %id, error = %err, "Error of previous message ignored");
            return EventOutcome::Ignored(IgnoreReason::PreviousMessage);
        }

        if let Err(e) = entry.task.fail(Utc::now()) {
            warn!(task_id = %id, error = %e, "Failure rejected");
            return EventOutcome::Ignored(IgnoreReason::Finalized);
        }
        let completion = entry.completion.take();
        entry.in_flight = false;
        error!(task_id = %id, source, error = %err, "Task failed");

        self.guard(id.clone());
        self.publish(TaskUpdate::Failed {
            id: id.clone(),
            error: err.to_string(),
        });
        if let Some(completion) = completion {
            completion.resolve(Err(err));
        }
        EventOutcome::Applied
    }

    /// Entry for `id` if events for it may still take effect.
    fn live_entry(
        &mut self,
        id: &CorrelationId,
        event: &'static str,
    ) -> Result<&mut Entry, IgnoreReason> {
        self.purge_expired();

        if self.dedup.contains(id) {
            debug!(task_id = %id, event, "Duplicate event for finalized task ignored");
            return Err(IgnoreReason::Finalized);
        }
        match self.tasks.get_mut(id) {
            Some(entry) => Ok(entry),
            None => {
                debug!(task_id = %id, event, "Event for unknown task ignored");
                Err(IgnoreReason::UnknownTask)
            }
        }
    }

    fn guard(&mut self, id: CorrelationId) {
        let evicted = self.dedup.insert(id, Instant::now());
        self.forget(evicted);
    }

    fn purge_expired(&mut self) {
        let expired = self.dedup.purge_expired(Instant::now());
        self.forget(expired);
    }

    /// Drop terminal tasks whose ids left the guard.
    fn forget(&mut self, ids: Vec<CorrelationId>) {
        for id in ids {
            if self
                .tasks
                .get(&id)
                .is_some_and(|entry| entry.task.is_terminal())
            {
                self.tasks.remove(&id);
                debug!(task_id = %id, "Forgot finalized task");
            }
        }
    }

    fn publish(&self, update: TaskUpdate) {
        if let Some(tx) = &self.updates {
            // No subscribers is fine.
            let _ = tx.send(update);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use inkpost_core::TaskState;

    #[derive(Debug, Clone, PartialEq)]
    enum Sunk {
        Result(String),
        Error(String),
    }

    fn registry() -> TaskRegistry {
        TaskRegistry::new(DedupGuard::new(Duration::from_secs(600), 1024))
    }

    fn recording() -> (Completion<String>, Arc<Mutex<Vec<Sunk>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let ok = calls.clone();
        let err = calls.clone();
        let completion = Completion::callbacks(
            move |text| ok.lock().unwrap().push(Sunk::Result(text)),
            move |e| err.lock().unwrap().push(Sunk::Error(e.to_string())),
        );
        (completion, calls)
    }

    fn id(s: &str) -> CorrelationId {
        CorrelationId::new(s)
    }

    #[test]
    fn test_chunks_then_done_resolve_once() {
        let mut registry = registry();
        let (completion, calls) = recording();
        registry.create(id("t1"), TaskKind::Chat, completion).unwrap();

        assert_eq!(registry.on_chunk(&id("t1"), "He", None), EventOutcome::Applied);
        assert_eq!(registry.get(&id("t1")).unwrap().state, TaskState::Streaming);
        registry.on_chunk(&id("t1"), "llo", None);
        assert_eq!(registry.on_done(&id("t1"), false, None), EventOutcome::Applied);

        assert_eq!(*calls.lock().unwrap(), vec![Sunk::Result("Hello".into())]);
        assert_eq!(registry.get(&id("t1")).unwrap().state, TaskState::Completed);
    }

    #[test]
    fn test_cached_done_without_chunks_resolves_empty() {
        let mut registry = registry();
        let (completion, calls) = recording();
        registry.create(id("t1"), TaskKind::Polish, completion).unwrap();

        assert_eq!(registry.on_done(&id("t1"), true, None), EventOutcome::Applied);

        assert_eq!(*calls.lock().unwrap(), vec![Sunk::Result(String::new())]);
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn test_cancel_makes_late_chunks_inert() {
        let mut registry = registry();
        let (completion, calls) = recording();
        registry.create(id("t1"), TaskKind::Chat, completion).unwrap();

        assert_eq!(registry.cancel(&id("t1")), EventOutcome::Applied);
        assert_eq!(
            registry.on_chunk(&id("t1"), "late", None),
            EventOutcome::Ignored(IgnoreReason::Finalized)
        );
        assert_eq!(
            registry.on_done(&id("t1"), false, None),
            EventOutcome::Ignored(IgnoreReason::Finalized)
        );

        let task = registry.get(&id("t1")).unwrap();
        assert_eq!(task.state, TaskState::Cancelled);
        assert_eq!(task.accumulated_text, "");
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_terminal_events_resolve_once() {
        let mut registry = registry();
        let (completion, calls) = recording();
        registry.create(id("t1"), TaskKind::Chat, completion).unwrap();

        registry.on_chunk(&id("t1"), "a", None);
        registry.on_error(&id("t1"), AssistError::ServerTask("boom".into()));
        registry.on_done(&id("t1"), true, None);
        registry.on_done(&id("t1"), false, None);
        registry.on_error(&id("t1"), AssistError::ServerTask("again".into()));
        registry.on_chunk(&id("t1"), "b", None);

        assert_eq!(
            *calls.lock().unwrap(),
            vec![Sunk::Error("server task error: boom".into())]
        );
        let task = registry.get(&id("t1")).unwrap();
        assert_eq!(task.state, TaskState::Failed);
        assert_eq!(task.accumulated_text, "a");
    }

    #[test]
    fn test_every_event_order_resolves_at_most_once() {
        // All orderings of {done, cached done, error, cancel} after one chunk.
        let events = ["done", "cached", "error", "cancel"];
        let mut orders = Vec::new();
        for a in 0..4 {
            for b in 0..4 {
                for c in 0..4 {
                    for d in 0..4 {
                        let order = [a, b, c, d];
                        let mut sorted = order;
                        sorted.sort_unstable();
                        if sorted == [0, 1, 2, 3] {
                            orders.push(order);
                        }
                    }
                }
            }
        }
        assert_eq!(orders.len(), 24);

        for order in orders {
            let mut registry = registry();
            let (completion, calls) = recording();
            registry.create(id("t"), TaskKind::Chat, completion).unwrap();
            registry.on_chunk(&id("t"), "x", None);

            for index in order {
                match events[index] {
                    "done" => {
                        registry.on_done(&id("t"), false, None);
                    }
                    "cached" => {
                        registry.on_done(&id("t"), true, None);
                    }
                    "error" => {
                        registry.on_error(&id("t"), AssistError::ServerTask("e".into()));
                    }
                    _ => {
                        registry.cancel(&id("t"));
                    }
                }
            }

            assert!(calls.lock().unwrap().len() <= 1, "order {:?}", order);
            assert!(registry.get(&id("t")).unwrap().is_terminal());
        }
    }

    #[test]
    fn test_create_rejects_active_id() {
        let mut registry = registry();
        let (first, _) = recording();
        let (second, calls) = recording();
        registry.create(id("s1"), TaskKind::Chat, first).unwrap();

        let err = registry.create(id("s1"), TaskKind::Chat, second).unwrap_err();
        assert!(matches!(err, AssistError::TaskAlreadyActive(_)));
        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_create_rearms_finalized_session() {
        let mut registry = registry();
        let (first, first_calls) = recording();
        registry.create(id("s1"), TaskKind::Chat, first).unwrap();
        registry.on_chunk(&id("s1"), "one", None);
        registry.on_done(&id("s1"), false, None);
        assert!(registry.is_finalized(&id("s1")));

        let (second, second_calls) = recording();
        registry.create(id("s1"), TaskKind::Chat, second).unwrap();
        assert!(!registry.is_finalized(&id("s1")));

        registry.on_chunk(&id("s1"), "two", None);
        registry.on_done(&id("s1"), false, None);

        assert_eq!(*first_calls.lock().unwrap(), vec![Sunk::Result("one".into())]);
        assert_eq!(*second_calls.lock().unwrap(), vec![Sunk::Result("two".into())]);
    }

    #[test]
    fn test_unknown_id_is_ignored() {
        let mut registry = registry();
        assert_eq!(
            registry.on_chunk(&id("ghost"), "boo", None),
            EventOutcome::Ignored(IgnoreReason::UnknownTask)
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_cancel_unknown_id_guards_future_events() {
        let mut registry = registry();
        assert_eq!(
            registry.cancel(&id("t1")),
            EventOutcome::Ignored(IgnoreReason::UnknownTask)
        );
        assert!(registry.is_finalized(&id("t1")));
    }

    #[test]
    fn test_size_cap_forgets_oldest_terminal_tasks() {
        let mut registry = TaskRegistry::new(DedupGuard::new(Duration::from_secs(600), 2));
        for name in ["a", "b", "c"] {
            let (completion, _) = recording();
            registry.create(id(name), TaskKind::Chat, completion).unwrap();
            registry.on_done(&id(name), false, None);
        }

        assert!(registry.get(&id("a")).is_none());
        assert!(registry.get(&id("b")).is_some());
        assert!(registry.get(&id("c")).is_some());
        // Evicted ids behave like unknown ones.
        assert_eq!(
            registry.on_done(&id("a"), true, None),
            EventOutcome::Ignored(IgnoreReason::UnknownTask)
        );
    }

    #[test]
    fn test_expire_stale_fails_quiet_tasks() {
        let mut registry = registry();
        let (quiet, quiet_calls) = recording();
        let (done, _) = recording();
        registry.create(id("quiet"), TaskKind::Chat, quiet).unwrap();
        registry.create(id("done"), TaskKind::Chat, done).unwrap();
        registry.on_done(&id("done"), false, None);

        let later = Utc::now() + chrono::Duration::minutes(10);
        let expired = registry.expire_stale(later, Duration::from_secs(60));

        assert_eq!(expired, vec![id("quiet")]);
        assert_eq!(registry.get(&id("quiet")).unwrap().state, TaskState::Failed);
        assert_eq!(quiet_calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_updates_are_published() {
        let (tx, mut rx) = broadcast::channel(16);
        let mut registry = registry().with_updates(tx);
        let (completion, _) = recording();
        registry.create(id("t1"), TaskKind::Chat, completion).unwrap();

        registry.on_chunk(&id("t1"), "hi", None);
        registry.on_done(&id("t1"), true, None);
        registry.on_chunk(&id("t1"), "late", None);

        assert_eq!(
            rx.try_recv().unwrap(),
            TaskUpdate::Chunk {
                id: id("t1"),
                text: "hi".into()
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            TaskUpdate::Done {
                id: id("t1"),
                text: "hi".into()
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_rearm_after_cancel_skips_previous_message_tail() {
        let mut registry = registry();
        let (first, first_calls) = recording();
        registry.create(id("s1"), TaskKind::Chat, first).unwrap();
        registry.cancel(&id("s1"));

        let (second, second_calls) = recording();
        registry.create(id("s1"), TaskKind::Chat, second).unwrap();

        assert_eq!(
            registry.on_chunk(&id("s1"), "late-from-cancelled", None),
            EventOutcome::Ignored(IgnoreReason::PreviousMessage)
        );
        assert_eq!(
            registry.on_done(&id("s1"), true, None),
            EventOutcome::Ignored(IgnoreReason::PreviousMessage)
        );
        assert_eq!(registry.get(&id("s1")).unwrap().state, TaskState::Pending);

        registry.on_chunk(&id("s1"), "fresh", None);
        assert_eq!(registry.on_done(&id("s1"), false, None), EventOutcome::Applied);

        assert!(first_calls.lock().unwrap().is_empty());
        assert_eq!(*second_calls.lock().unwrap(), vec![Sunk::Result("fresh".into())]);
    }

    #[test]
    fn test_new_message_id_ends_previous_message_tail() {
        let mut registry = registry();
        let (first, _) = recording();
        registry.create(id("s1"), TaskKind::Chat, first).unwrap();
        registry.on_chunk(&id("s1"), "par", Some(MessageId::new("m1")));
        registry.cancel(&id("s1"));

        let (second, second_calls) = recording();
        registry.create(id("s1"), TaskKind::Chat, second).unwrap();

        assert_eq!(
            registry.on_chunk(&id("s1"), "tial", Some(MessageId::new("m1"))),
            EventOutcome::Ignored(IgnoreReason::PreviousMessage)
        );
        // The previous message's done was lost; the next message id takes over.
        assert_eq!(
            registry.on_chunk(&id("s1"), "new", Some(MessageId::new("m2"))),
            EventOutcome::Applied
        );
        registry.on_done(&id("s1"), false, Some(MessageId::new("m2")));

        assert_eq!(*second_calls.lock().unwrap(), vec![Sunk::Result("new".into())]);
    }

    #[test]
    fn test_rearm_after_unsent_cancel_applies_immediately() {
        let mut registry = registry();
        let (first, _) = recording();
        registry.create(id("s1"), TaskKind::Chat, first).unwrap();
        registry.attach_outbound(&id("s1"), OutboundId::new("o1"));
        assert_eq!(registry.outbound_of(&id("s1")), Some(&OutboundId::new("o1")));
        registry.cancel(&id("s1"));
        registry.mark_unsent(&id("s1"));
        assert_eq!(registry.outbound_of(&id("s1")), None);

        let (second, second_calls) = recording();
        registry.create(id("s1"), TaskKind::Chat, second).unwrap();
        assert_eq!(registry.on_chunk(&id("s1"), "two", None), EventOutcome::Applied);
        registry.on_done(&id("s1"), false, None);

        assert_eq!(*second_calls.lock().unwrap(), vec![Sunk::Result("two".into())]);
    }

    #[test]
    fn test_rearm_after_server_error_applies_immediately() {
        let mut registry = registry();
        let (first, _) = recording();
        registry.create(id("s1"), TaskKind::Chat, first).unwrap();
        registry.on_error(&id("s1"), AssistError::ServerTask("boom".into()));

        let (second, second_calls) = recording();
        registry.create(id("s1"), TaskKind::Chat, second).unwrap();
        assert_eq!(registry.on_chunk(&id("s1"), "two", None), EventOutcome::Applied);
        registry.on_done(&id("s1"), false, None);

        assert_eq!(*second_calls.lock().unwrap(), vec![Sunk::Result("two".into())]);
    }
}
