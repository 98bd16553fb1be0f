//! Test doubles for the transport and job collaborators.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use inkpost_core::{
    CorrelationId, JobState, JobStatus, JobSubmission, OutboundRequest, TaskId,
};

use crate::error::AssistError;
use crate::outbound::OutboundQueue;
use crate::transport::{JobClient, StreamTransport};

/// Records sends; optionally fails the first `fail_first` attempts and holds
/// one attempt open until its gate is released.
#[derive(Default)]
pub struct MockTransport {
    fail_first: usize,
    gate: Option<(usize, Arc<Notify>)>,
    attempts: AtomicUsize,
    sent: Mutex<Vec<OutboundRequest>>,
    cancelled: Mutex<Vec<CorrelationId>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every send fails.
    pub fn failing() -> Self {
        Self::failing_first(usize::MAX)
    }

    pub fn failing_first(n: usize) -> Self {
        Self {
            fail_first: n,
            ..Self::default()
        }
    }

    /// Attempt number `attempt` (zero-based) waits for `gate` before
    /// completing.
    pub fn with_gate(mut self, attempt: usize, gate: Arc<Notify>) -> Self {
        self.gate = Some((attempt, gate));
        self
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Successfully sent requests, in send order.
    pub fn sent(&self) -> Vec<OutboundRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<CorrelationId> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl StreamTransport for MockTransport {
    async fn send(&self, request: &OutboundRequest) -> Result<(), AssistError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some((gated, gate)) = &self.gate {
            if *gated == attempt {
                gate.notified().await;
            }
        }
        if attempt < self.fail_first {
            return Err(AssistError::Transport("mock send failure".to_string()));
        }
        self.sent.lock().unwrap().push(request.clone());
        Ok(())
    }

    async fn cancel(&self, id: &CorrelationId) -> Result<(), AssistError> {
        self.cancelled.lock().unwrap().push(id.clone());
        Ok(())
    }
}

/// Answers status checks from a script; `Err` entries become transport
/// errors. Once the script runs out every check reports `processing`.
pub struct ScriptedJobClient {
    task_id: TaskId,
    gate: Option<Arc<Notify>>,
    script: Mutex<VecDeque<Result<JobStatus, String>>>,
    status_calls: AtomicUsize,
    submissions: Mutex<Vec<JobSubmission>>,
}

impl ScriptedJobClient {
    pub fn new(task_id: &str, script: Vec<Result<JobStatus, String>>) -> Self {
        Self {
            task_id: TaskId::new(task_id),
            gate: None,
            script: Mutex::new(script.into()),
            status_calls: AtomicUsize::new(0),
            submissions: Mutex::new(Vec::new()),
        }
    }

    /// Every status check waits for `gate` after it is counted.
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn submissions(&self) -> Vec<JobSubmission> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobClient for ScriptedJobClient {
    async fn submit(&self, submission: &JobSubmission) -> Result<TaskId, AssistError> {
        self.submissions.lock().unwrap().push(submission.clone());
        Ok(self.task_id.clone())
    }

    async fn status(&self, _task_id: &TaskId) -> Result<JobStatus, AssistError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(status)) => Ok(status),
            Some(Err(message)) => Err(AssistError::Transport(message)),
            None => Ok(JobStatus::new(JobState::Processing)),
        }
    }
}

/// Wait until the queue reports `target` pending messages.
pub async fn wait_for_pending(queue: &OutboundQueue, target: usize) {
    let mut rx = queue.watch_pending();
    while *rx.borrow_and_update() != target {
        rx.changed().await.unwrap();
    }
}
