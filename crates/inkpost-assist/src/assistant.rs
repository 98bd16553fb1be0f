//! The assistant facade: one entry point for chat, streaming transforms and
//! discrete jobs.
//!
//! Task state is owned by a single background loop. Callers, the inbound
//! event path and the outbound queue's failure callbacks talk to it over an
//! unbounded channel, so result sinks may call back into the assistant.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use inkpost_core::{
    CoreError, CorrelationId, JobOutput, JobSubmission, OutboundRequest, SessionId, StreamEvent,
    Task, TaskId, TaskKind, TransformOptions,
};

use crate::completion::{Completion, Outcome};
use crate::config::AssistConfig;
use crate::connection::TransportState;
use crate::dedup::DedupGuard;
use crate::error::AssistError;
use crate::outbound::{FailureSink, OutboundQueue};
use crate::polling::{PollOptions, PollingCoordinator};
use crate::registry::{EventOutcome, TaskRegistry, TaskUpdate};
use crate::router;
use crate::transport::{JobClient, StreamTransport};

enum Command {
    /// Register the task and, once registered, queue its request.
    Create {
        id: CorrelationId,
        kind: TaskKind,
        completion: Completion<String>,
        outgoing: Outgoing,
        reply: oneshot::Sender<Result<(), AssistError>>,
    },
    Event(StreamEvent),
    Fail {
        id: CorrelationId,
        error: AssistError,
    },
    Cancel(CorrelationId),
    Get {
        id: CorrelationId,
        reply: oneshot::Sender<Option<Task>>,
    },
}

struct Outgoing {
    session_id: SessionId,
    payload: OutboundRequest,
    on_failure: FailureSink,
}

/// Awaits the text of a streamed task.
#[derive(Debug)]
pub struct TaskHandle {
    id: CorrelationId,
    outcome: Outcome<String>,
}

impl TaskHandle {
    /// Id inbound events for this task are correlated by.
    pub fn id(&self) -> &CorrelationId {
        &self.id
    }
}

impl Future for TaskHandle {
    type Output = Result<String, AssistError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.outcome).poll(cx)
    }
}

/// Awaits the normalized output of a discrete job.
#[derive(Debug)]
pub struct JobHandle {
    task_id: TaskId,
    outcome: Outcome<JobOutput>,
}

impl JobHandle {
    /// Server-assigned job id.
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }
}

impl Future for JobHandle {
    type Output = Result<JobOutput, AssistError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.outcome).poll(cx)
    }
}

/// Coordinates AI tasks for one application session.
///
/// Must be created inside a tokio runtime. Dropping the assistant stops its
/// background tasks; unresolved handles then yield [`AssistError::Cancelled`].
pub struct Assistant {
    commands: mpsc::UnboundedSender<Command>,
    transport: Arc<dyn StreamTransport>,
    jobs: Arc<dyn JobClient>,
    outbound: Arc<OutboundQueue>,
    polling: PollingCoordinator,
    state: TransportState,
    updates: broadcast::Sender<TaskUpdate>,
    poll_options: PollOptions,
    shutdown: CancellationToken,
}

impl Assistant {
    pub fn new(
        config: AssistConfig,
        transport: Arc<dyn StreamTransport>,
        jobs: Arc<dyn JobClient>,
    ) -> Self {
        let state = TransportState::new();
        let (updates, _) = broadcast::channel(config.update_capacity.max(1));
        let registry = TaskRegistry::new(DedupGuard::from_config(&config.dedup))
            .with_updates(updates.clone());

        let outbound = Arc::new(OutboundQueue::spawn(
            config.retry.clone(),
            transport.clone(),
            state.clone(),
        ));

        let (commands, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        tokio::spawn(run_registry(
            registry,
            outbound.clone(),
            rx,
            config.sweep_interval(),
            config.stream_idle_timeout(),
            shutdown.clone(),
        ));

        let polling = PollingCoordinator::new(jobs.clone());

        Self {
            commands,
            transport,
            jobs,
            outbound,
            polling,
            state,
            updates,
            poll_options: PollOptions::from(&config.poll),
            shutdown,
        }
    }

    /// Send a chat message. Replies are correlated by `session_id`, so a
    /// session can have one message in flight at a time.
    pub async fn chat(
        &self,
        session_id: SessionId,
        text: impl Into<String>,
    ) -> Result<TaskHandle, AssistError> {
        let id = CorrelationId::from(&session_id);
        let payload = OutboundRequest::Chat {
            session_id: session_id.clone(),
            text: text.into(),
        };
        self.stream(id, TaskKind::Chat, session_id, payload).await
    }

    /// Start a streaming transform of `text`.
    pub async fn transform(
        &self,
        kind: TaskKind,
        text: impl Into<String>,
        options: TransformOptions,
    ) -> Result<TaskHandle, AssistError> {
        if kind == TaskKind::Chat || !kind.supports_streaming() {
            return Err(CoreError::InvalidInput(format!("'{}' cannot be streamed", kind)).into());
        }

        let task_id = TaskId::generate();
        // Transforms have no session; each gets its own FIFO.
        let session_id = SessionId::new(task_id.as_str());
        let payload = OutboundRequest::Transform {
            kind,
            task_id: task_id.clone(),
            text: text.into(),
            options,
        };
        self.stream(CorrelationId::from(task_id), kind, session_id, payload)
            .await
    }

    async fn stream(
        &self,
        id: CorrelationId,
        kind: TaskKind,
        session_id: SessionId,
        payload: OutboundRequest,
    ) -> Result<TaskHandle, AssistError> {
        let commands = self.commands.clone();
        let failed_id = id.clone();
        let on_failure: FailureSink = Box::new(move |error| {
            let _ = commands.send(Command::Fail {
                id: failed_id,
                error,
            });
        });

        let (completion, outcome) = Completion::channel();
        let (reply, created) = oneshot::channel();
        self.send(Command::Create {
            id: id.clone(),
            kind,
            completion,
            outgoing: Outgoing {
                session_id,
                payload,
                on_failure,
            },
            reply,
        })?;
        created.await.map_err(|_| AssistError::ShutDown)??;

        Ok(TaskHandle { id, outcome })
    }

    /// Submit a discrete job and poll it until it finishes.
    pub async fn submit_job(
        &self,
        kind: TaskKind,
        text: impl Into<String>,
        options: TransformOptions,
    ) -> Result<JobHandle, AssistError> {
        if self.shutdown.is_cancelled() {
            return Err(AssistError::ShutDown);
        }

        let submission = JobSubmission::new(kind, text, options)?;
        let task_id = self.jobs.submit(&submission).await?;
        info!(task_id = %task_id, kind = %kind, "Job submitted");

        let (completion, outcome) = Completion::channel();
        self.polling
            .start(task_id.clone(), kind, self.poll_options, completion)?;
        Ok(JobHandle { task_id, outcome })
    }

    /// Abandon a task or job.
    ///
    /// Later events for `id` are ignored and its handle yields
    /// [`AssistError::Cancelled`]. A request still waiting in the outbound
    /// queue is withdrawn; one already sent is not recalled. The server is
    /// asked to stop in the background; its answer is not awaited.
    pub fn cancel(&self, id: &CorrelationId) -> Result<(), AssistError> {
        self.send(Command::Cancel(id.clone()))?;
        self.polling.cancel(&TaskId::new(id.as_str()));

        let transport = self.transport.clone();
        let id = id.clone();
        tokio::spawn(async move {
            if let Err(e) = transport.cancel(&id).await {
                debug!(task_id = %id, error = %e, "Remote cancel failed");
            }
        });
        Ok(())
    }

    /// Inbound path for a decoded push-channel event.
    pub fn handle_event(&self, event: StreamEvent) -> Result<(), AssistError> {
        self.send(Command::Event(event))
    }

    /// Inbound path for a raw JSON frame.
    pub fn handle_frame(&self, frame: &str) -> Result<(), AssistError> {
        let event = StreamEvent::from_json(frame)?;
        self.handle_event(event)
    }

    /// Snapshot of a streamed task.
    pub async fn task(&self, id: &CorrelationId) -> Result<Option<Task>, AssistError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Get {
            id: id.clone(),
            reply,
        })?;
        rx.await.map_err(|_| AssistError::ShutDown)
    }

    /// Connection state shared with the push-channel implementation, which
    /// reports connects and disconnects through it.
    pub fn transport_state(&self) -> TransportState {
        self.state.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Outbound messages not yet sent or failed.
    pub fn pending_count(&self) -> usize {
        self.outbound.pending_count()
    }

    pub fn watch_pending(&self) -> watch::Receiver<usize> {
        self.outbound.watch_pending()
    }

    /// Updates for every task.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskUpdate> {
        self.updates.subscribe()
    }

    /// Updates for one task. Updates missed by a lagging subscriber are
    /// skipped.
    pub fn updates_for(&self, id: CorrelationId) -> impl Stream<Item = TaskUpdate> + Send + 'static {
        BroadcastStream::new(self.updates.subscribe()).filter_map(move |update| match update {
            Ok(update) if update.id() == &id => Some(update),
            _ => None,
        })
    }

    /// Number of jobs being polled.
    pub fn active_jobs(&self) -> usize {
        self.polling.active_count()
    }

    /// Stop every background task and abort all polls.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Assistant shutting down");
        }
        self.shutdown.cancel();
        self.outbound.shutdown();
        self.polling.shutdown();
    }

    fn send(&self, command: Command) -> Result<(), AssistError> {
        if self.shutdown.is_cancelled() {
            return Err(AssistError::ShutDown);
        }
        self.commands.send(command).map_err(|_| AssistError::ShutDown)
    }
}

impl Drop for Assistant {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.outbound.shutdown();
    }
}

async fn run_registry(
    mut registry: TaskRegistry,
    outbound: Arc<OutboundQueue>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    sweep_every: Duration,
    idle_timeout: Duration,
    shutdown: CancellationToken,
) {
    let period = sweep_every.max(Duration::from_millis(1));
    let mut sweep = interval_at(Instant::now() + period, period);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            command = commands.recv() => match command {
                Some(command) => apply(&mut registry, &outbound, command),
                None => break,
            },
            _ = sweep.tick() => {
                let expired = registry.expire_stale(Utc::now(), idle_timeout);
                if !expired.is_empty() {
                    info!(count = expired.len(), "Expired idle streaming tasks");
                }
            }
        }
    }

    debug!(tasks = registry.len(), "Registry loop stopped");
}

fn apply(registry: &mut TaskRegistry, outbound: &OutboundQueue, command: Command) {
    match command {
        Command::Create {
            id,
            kind,
            completion,
            outgoing,
            reply,
        } => {
            let created = registry.create(id.clone(), kind, completion);
            if created.is_ok() {
                let queued = outbound.enqueue(
                    outgoing.session_id,
                    outgoing.payload,
                    Some(outgoing.on_failure),
                );
                registry.attach_outbound(&id, queued);
            }
            let _ = reply.send(created);
        }
        Command::Event(event) => {
            if let EventOutcome::Ignored(reason) = router::route(registry, event) {
                debug!(reason = ?reason, "Inbound event ignored");
            }
        }
        Command::Fail { id, error } => {
            registry.fail(&id, error);
        }
        Command::Cancel(id) => {
            let withdrawn = registry
                .outbound_of(&id)
                .is_some_and(|queued| outbound.withdraw(queued));
            registry.cancel(&id);
            if withdrawn {
                registry.mark_unsent(&id);
            }
        }
        Command::Get { id, reply } => {
            let _ = reply.send(registry.get(&id).cloned());
        }
    }
}
