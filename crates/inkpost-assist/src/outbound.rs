//! Reliable delivery of outbound push-channel requests.
//!
//! Requests are kept in one FIFO per session. A single driver task sends
//! them: only the head of each session's FIFO is eligible, and eligible heads
//! go out one at a time in enqueue order. Failed sends are retried with capped
//! exponential backoff until `max_attempts`; a transition into `Connected`
//! makes every waiting head eligible again immediately.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{watch, Notify};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use inkpost_core::{ConnectionState, OutboundId, OutboundRequest, OutboundState, SessionId};

use crate::config::RetryConfig;
use crate::connection::TransportState;
use crate::error::AssistError;
use crate::transport::StreamTransport;

/// Called once when a message exhausts its retries.
pub type FailureSink = Box<dyn FnOnce(AssistError) + Send>;

/// A request held by the queue.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub id: OutboundId,
    pub session_id: SessionId,
    pub payload: OutboundRequest,
    pub state: OutboundState,
    /// Send attempts made so far.
    pub attempt_count: u32,
    /// Earliest time of the next attempt; `None` means as soon as possible.
    pub next_retry_at: Option<Instant>,
    /// Enqueue order across all sessions.
    pub seq: u64,
}

struct Slot {
    message: OutboundMessage,
    on_failure: Option<FailureSink>,
}

#[derive(Default)]
struct QueueInner {
    sessions: HashMap<SessionId, VecDeque<Slot>>,
    /// Sent, failed and withdrawn messages, oldest first.
    history: VecDeque<OutboundMessage>,
    next_seq: u64,
}

impl QueueInner {
    fn pending(&self) -> usize {
        self.sessions.values().map(VecDeque::len).sum()
    }

    /// Oldest session head that may be sent at `now`.
    fn next_eligible(&self, now: Instant) -> Option<SessionId> {
        self.sessions
            .iter()
            .filter_map(|(session, fifo)| fifo.front().map(|slot| (session, &slot.message)))
            .filter(|(_, message)| {
                message.state == OutboundState::Queued
                    && message.next_retry_at.map_or(true, |at| at <= now)
            })
            .min_by_key(|(_, message)| message.seq)
            .map(|(session, _)| session.clone())
    }

    /// Earliest scheduled retry among session heads.
    fn next_retry_at(&self) -> Option<Instant> {
        self.sessions
            .values()
            .filter_map(|fifo| fifo.front())
            .filter(|slot| slot.message.state == OutboundState::Queued)
            .filter_map(|slot| slot.message.next_retry_at)
            .min()
    }

    /// Clear every scheduled retry so waiting heads go out now.
    fn release_all(&mut self) -> usize {
        let mut released = 0;
        for fifo in self.sessions.values_mut() {
            for slot in fifo.iter_mut() {
                if slot.message.state == OutboundState::Queued {
                    slot.message.next_retry_at = None;
                    released += 1;
                }
            }
        }
        released
    }

    fn pop_head(&mut self, session: &SessionId) -> Option<Slot> {
        let fifo = self.sessions.get_mut(session)?;
        let slot = fifo.pop_front();
        if fifo.is_empty() {
            self.sessions.remove(session);
        }
        slot
    }

    fn record(&mut self, message: OutboundMessage, limit: usize) {
        self.history.push_back(message);
        while self.history.len() > limit {
            self.history.pop_front();
        }
    }

    fn find(&self, id: &OutboundId) -> Option<&OutboundMessage> {
        self.sessions
            .values()
            .flat_map(|fifo| fifo.iter().map(|slot| &slot.message))
            .chain(self.history.iter())
            .find(|message| &message.id == id)
    }
}

/// State shared between the queue handle and its driver task.
struct Shared {
    inner: Mutex<QueueInner>,
    wake: Notify,
    pending_tx: watch::Sender<usize>,
    config: RetryConfig,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        // A panic while holding the lock cannot leave the lists half-updated
        // in a way later operations rely on, so keep going.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish_pending(&self, inner: &QueueInner) {
        self.pending_tx.send_replace(inner.pending());
    }
}

/// Queue of outbound requests with retry and reconnect flush.
///
/// Must be created inside a tokio runtime; the driver task stops on
/// [`OutboundQueue::shutdown`] or when the queue is dropped.
pub struct OutboundQueue {
    shared: Arc<Shared>,
    state: TransportState,
    shutdown: CancellationToken,
}

impl OutboundQueue {
    /// Create the queue and spawn its driver.
    pub fn spawn(
        config: RetryConfig,
        transport: Arc<dyn StreamTransport>,
        state: TransportState,
    ) -> Self {
        let (pending_tx, _pending_rx) = watch::channel(0);
        let shared = Arc::new(Shared {
            inner: Mutex::new(QueueInner::default()),
            wake: Notify::new(),
            pending_tx,
            config,
        });
        let shutdown = CancellationToken::new();

        tokio::spawn(run_driver(
            shared.clone(),
            transport,
            state.clone(),
            shutdown.clone(),
        ));

        Self {
            shared,
            state,
            shutdown,
        }
    }

    /// Append a request to its session's FIFO.
    ///
    /// The request goes out right away if the push channel is connected and
    /// nothing is ahead of it in the session.
    pub fn enqueue(
        &self,
        session_id: SessionId,
        payload: OutboundRequest,
        on_failure: Option<FailureSink>,
    ) -> OutboundId {
        let id = OutboundId::generate();
        {
            let mut inner = self.shared.lock();
            let seq = inner.next_seq;
            inner.next_seq += 1;

            let message = OutboundMessage {
                id: id.clone(),
                session_id: session_id.clone(),
                payload,
                state: OutboundState::Queued,
                attempt_count: 0,
                next_retry_at: None,
                seq,
            };
            inner
                .sessions
                .entry(session_id.clone())
                .or_default()
                .push_back(Slot {
                    message,
                    on_failure,
                });
            self.shared.publish_pending(&inner);
        }

        debug!(
            message_id = %id,
            session_id = %session_id,
            connected = self.state.is_connected(),
            "Outbound message enqueued"
        );
        self.shared.wake.notify_one();
        id
    }

    /// Messages not yet sent or failed.
    pub fn pending_count(&self) -> usize {
        *self.shared.pending_tx.borrow()
    }

    /// Watch the pending count.
    pub fn watch_pending(&self) -> watch::Receiver<usize> {
        self.shared.pending_tx.subscribe()
    }

    /// Look up a message, including recently finished ones.
    pub fn message(&self, id: &OutboundId) -> Option<OutboundMessage> {
        self.shared.lock().find(id).cloned()
    }

    /// State of a message, if still known.
    pub fn state(&self, id: &OutboundId) -> Option<OutboundState> {
        self.shared.lock().find(id).map(|message| message.state)
    }

    /// Drop a message that has not been handed to the transport.
    ///
    /// Returns false if the message is being sent, already finished or
    /// unknown. A withdrawn message's failure callback is never called.
    pub fn withdraw(&self, id: &OutboundId) -> bool {
        let mut inner = self.shared.lock();
        let found = inner.sessions.iter().find_map(|(session, fifo)| {
            fifo.iter()
                .position(|slot| &slot.message.id == id)
                .map(|pos| (session.clone(), pos))
        });
        let Some((session, pos)) = found else {
            return false;
        };
        let Some(fifo) = inner.sessions.get_mut(&session) else {
            return false;
        };
        if fifo[pos].message.state != OutboundState::Queued {
            debug!(message_id = %id, "Outbound message in flight, not withdrawn");
            return false;
        }
        let Some(mut slot) = fifo.remove(pos) else {
            return false;
        };
        if fifo.is_empty() {
            inner.sessions.remove(&session);
        }

        slot.message.state = OutboundState::Cancelled;
        slot.message.next_retry_at = None;
        inner.record(slot.message, self.shared.config.history_limit);
        self.shared.publish_pending(&inner);

        debug!(message_id = %id, session_id = %session, "Outbound message withdrawn");
        true
    }

    /// Stop the driver. Queued messages stay queued and are never sent.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for OutboundQueue {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl fmt::Debug for OutboundQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundQueue")
            .field("pending", &self.pending_count())
            .finish()
    }
}

async fn run_driver(
    shared: Arc<Shared>,
    transport: Arc<dyn StreamTransport>,
    state: TransportState,
    shutdown: CancellationToken,
) {
    let mut state_rx = state.subscribe();
    let mut connected = *state_rx.borrow_and_update() == ConnectionState::Connected;

    loop {
        if connected {
            pump(&shared, transport.as_ref(), &state).await;
        }

        let retry_at = if connected {
            shared.lock().next_retry_at()
        } else {
            None
        };
        let retry_timer = async move {
            match retry_at {
                Some(at) => sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = shared.wake.notified() => {}
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                // `set` only notifies on a real change, so a change that reads
                // Connected is a reconnect even if the Disconnected in between
                // was coalesced.
                let now_connected = *state_rx.borrow_and_update() == ConnectionState::Connected;
                if now_connected {
                    let mut inner = shared.lock();
                    let released = inner.release_all();
                    if released > 0 {
                        info!(messages = released, "Push channel connected, flushing outbound queue");
                    }
                }
                connected = now_connected;
            }
            _ = retry_timer => {}
        }
    }

    debug!("Outbound queue driver stopped");
}

/// Send every eligible head, oldest first, until none is left.
async fn pump(shared: &Shared, transport: &dyn StreamTransport, state: &TransportState) {
    loop {
        if !state.is_connected() {
            return;
        }

        let (session, payload, message_id, attempt) = {
            let mut inner = shared.lock();
            let Some(session) = inner.next_eligible(Instant::now()) else {
                return;
            };
            let Some(slot) = inner
                .sessions
                .get_mut(&session)
                .and_then(|fifo| fifo.front_mut())
            else {
                return;
            };
            slot.message.state = OutboundState::Sending;
            slot.message.attempt_count += 1;
            (
                session,
                slot.message.payload.clone(),
                slot.message.id.clone(),
                slot.message.attempt_count,
            )
        };

        let result = transport.send(&payload).await;

        let failed = {
            let mut inner = shared.lock();
            let outcome = match result {
                Ok(()) => {
                    debug!(message_id = %message_id, session_id = %session, attempt, "Outbound message sent");
                    if let Some(mut slot) = inner.pop_head(&session) {
                        slot.message.state = OutboundState::Sent;
                        slot.message.next_retry_at = None;
                        inner.record(slot.message, shared.config.history_limit);
                    }
                    None
                }
                Err(e) if attempt >= shared.config.max_attempts => {
                    error!(
                        message_id = %message_id,
                        session_id = %session,
                        attempts = attempt,
                        error = %e,
                        "Outbound message failed, retries exhausted"
                    );
                    match inner.pop_head(&session) {
                        Some(mut slot) => {
                            slot.message.state = OutboundState::Failed;
                            slot.message.next_retry_at = None;
                            inner.record(slot.message, shared.config.history_limit);
                            slot.on_failure
                        }
                        None => None,
                    }
                }
                Err(e) => {
                    let delay = shared.config.delay_after(attempt);
                    warn!(
                        message_id = %message_id,
                        session_id = %session,
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "Outbound send failed, will retry"
                    );
                    if let Some(slot) = inner
                        .sessions
                        .get_mut(&session)
                        .and_then(|fifo| fifo.front_mut())
                    {
                        slot.message.state = OutboundState::Queued;
                        slot.message.next_retry_at = Some(Instant::now() + delay);
                    }
                    None
                }
            };
            shared.publish_pending(&inner);
            outcome.map(|sink| (sink, attempt))
        };

        // Sink runs outside the lock.
        if let Some((sink, attempts)) = failed {
            sink(AssistError::ClientTimeout {
                operation: "send",
                attempts,
            });
        }
    }
}
