//! Fixed-interval status polling for discrete jobs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::AbortHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use inkpost_core::{CorrelationId, JobOutput, JobState, TaskId, TaskKind};

use crate::completion::Completion;
use crate::config::PollConfig;
use crate::error::AssistError;
use crate::transport::JobClient;

/// Per-job polling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self::from(&PollConfig::default())
    }
}

impl From<&PollConfig> for PollOptions {
    fn from(config: &PollConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.interval_ms),
            max_attempts: config.max_attempts,
        }
    }
}

/// How far a job's polling has got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollProgress {
    /// Status checks started so far.
    pub attempts: u32,
    pub max_attempts: u32,
}

#[derive(Debug)]
struct PollHandle {
    abort: AbortHandle,
    generation: u64,
    attempts: Arc<AtomicU32>,
    max_attempts: u32,
}

type HandleMap = Arc<Mutex<HashMap<TaskId, PollHandle>>>;

fn lock(handles: &Mutex<HashMap<TaskId, PollHandle>>) -> MutexGuard<'_, HashMap<TaskId, PollHandle>> {
    handles.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Drives one polling task per job and owns their handles.
///
/// Every exit (completed, failed, attempts exhausted, cancel, shutdown)
/// removes the job's handle, and no status fetch happens afterwards.
pub struct PollingCoordinator {
    client: Arc<dyn JobClient>,
    handles: HandleMap,
    generation: AtomicU64,
}

impl PollingCoordinator {
    pub fn new(client: Arc<dyn JobClient>) -> Self {
        Self {
            client,
            handles: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// Start polling `task_id`. The first status check happens one interval
    /// from now.
    ///
    /// If the job is already being polled, `completion` is rejected with
    /// [`AssistError::TaskAlreadyActive`] and the same error is returned.
    pub fn start(
        &self,
        task_id: TaskId,
        kind: TaskKind,
        options: PollOptions,
        completion: Completion<JobOutput>,
    ) -> Result<(), AssistError> {
        let mut handles = lock(&self.handles);
        if handles.contains_key(&task_id) {
            warn!(task_id = %task_id, "Job already being polled");
            completion.resolve(Err(AssistError::TaskAlreadyActive(CorrelationId::from(
                &task_id,
            ))));
            return Err(AssistError::TaskAlreadyActive(CorrelationId::from(task_id)));
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let attempts = Arc::new(AtomicU32::new(0));
        info!(
            task_id = %task_id,
            kind = %kind,
            interval_ms = options.interval.as_millis() as u64,
            max_attempts = options.max_attempts,
            "Polling job"
        );

        // The task cannot remove its handle before it is inserted: removal
        // takes the lock held here.
        let join = tokio::spawn(run_poll(
            self.client.clone(),
            self.handles.clone(),
            generation,
            task_id.clone(),
            kind,
            options,
            attempts.clone(),
            completion,
        ));
        handles.insert(
            task_id,
            PollHandle {
                abort: join.abort_handle(),
                generation,
                attempts,
                max_attempts: options.max_attempts.max(1),
            },
        );
        Ok(())
    }

    /// Stop polling `task_id`, including an in-flight request.
    ///
    /// The completion is dropped unresolved. Returns true if the job was
    /// being polled.
    pub fn cancel(&self, task_id: &TaskId) -> bool {
        match lock(&self.handles).remove(task_id) {
            Some(handle) => {
                handle.abort.abort();
                info!(task_id = %task_id, "Polling cancelled");
                true
            }
            None => false,
        }
    }

    /// Abort every live poll.
    pub fn shutdown(&self) {
        let drained: Vec<_> = lock(&self.handles).drain().collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "Aborting active polls");
        }
        for (_, handle) in drained {
            handle.abort.abort();
        }
    }

    pub fn active_count(&self) -> usize {
        lock(&self.handles).len()
    }

    pub fn is_polling(&self, task_id: &TaskId) -> bool {
        lock(&self.handles).contains_key(task_id)
    }

    /// Attempt counter of a job being polled.
    pub fn progress(&self, task_id: &TaskId) -> Option<PollProgress> {
        lock(&self.handles).get(task_id).map(|handle| PollProgress {
            attempts: handle.attempts.load(Ordering::Relaxed),
            max_attempts: handle.max_attempts,
        })
    }
}

impl Drop for PollingCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_poll(
    client: Arc<dyn JobClient>,
    handles: HandleMap,
    generation: u64,
    task_id: TaskId,
    kind: TaskKind,
    options: PollOptions,
    attempts: Arc<AtomicU32>,
    completion: Completion<JobOutput>,
) {
    let outcome = poll_until_terminal(client.as_ref(), &task_id, kind, options, &attempts).await;

    // Only the poll that still owns its handle may resolve. A missing or
    // newer handle means the job was cancelled while the last check ran.
    let owned = {
        let mut handles = lock(&handles);
        let owned = handles
            .get(&task_id)
            .is_some_and(|handle| handle.generation == generation);
        if owned {
            handles.remove(&task_id);
        }
        owned
    };
    if !owned {
        debug!(task_id = %task_id, "Polling cancelled, dropping result");
        return;
    }

    match &outcome {
        Ok(_) => info!(task_id = %task_id, "Job completed"),
        Err(e) => error!(task_id = %task_id, error = %e, "Job failed"),
    }
    completion.resolve(outcome);
}

async fn poll_until_terminal(
    client: &dyn JobClient,
    task_id: &TaskId,
    kind: TaskKind,
    options: PollOptions,
    counter: &AtomicU32,
) -> Result<JobOutput, AssistError> {
    let max_attempts = options.max_attempts.max(1);
    let period = options.interval.max(Duration::from_millis(1));
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut attempts = 0;
    loop {
        ticker.tick().await;
        attempts += 1;
        counter.store(attempts, Ordering::Relaxed);

        match client.status(task_id).await {
            Ok(status) => match status.status {
                JobState::Completed => {
                    return Ok(JobOutput::from_result(kind, status.result)?);
                }
                JobState::Failed => {
                    let message = status
                        .error
                        .unwrap_or_else(|| "job failed without an error message".to_string());
                    return Err(AssistError::ServerTask(message));
                }
                JobState::Pending | JobState::Processing => {
                    debug!(
                        task_id = %task_id,
                        attempt = attempts,
                        status = ?status.status,
                        progress = ?status.progress,
                        "Job still running"
                    );
                }
            },
            Err(e) => {
                warn!(task_id = %task_id, attempt = attempts, error = %e, "Status check failed");
            }
        }

        if attempts >= max_attempts {
            return Err(AssistError::ClientTimeout {
                operation: "poll",
                attempts,
            });
        }
    }
}
