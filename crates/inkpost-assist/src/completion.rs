//! Caller-supplied result/error sinks.
//!
//! A [`Completion`] is consumed by [`Completion::resolve`], so a task can
//! resolve its caller at most once. Dropping an unresolved completion (on
//! cancel or shutdown) invokes neither callback; a channel-backed completion
//! then yields [`AssistError::Cancelled`] to its waiter.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::AssistError;

/// Success callback.
pub type ResultSink<T> = Box<dyn FnOnce(T) + Send>;

/// Failure callback.
pub type ErrorSink = Box<dyn FnOnce(AssistError) + Send>;

/// Where a task's terminal outcome goes.
pub enum Completion<T> {
    /// Separate success and failure callbacks.
    Callbacks {
        on_result: ResultSink<T>,
        on_error: ErrorSink,
    },
    /// A one-shot channel awaited through [`Outcome`].
    Channel(oneshot::Sender<Result<T, AssistError>>),
}

impl<T: Send + 'static> Completion<T> {
    /// Build a completion from two callbacks.
    pub fn callbacks(
        on_result: impl FnOnce(T) + Send + 'static,
        on_error: impl FnOnce(AssistError) + Send + 'static,
    ) -> Self {
        Self::Callbacks {
            on_result: Box::new(on_result),
            on_error: Box::new(on_error),
        }
    }

    /// Build a channel-backed completion and the future that awaits it.
    pub fn channel() -> (Self, Outcome<T>) {
        let (tx, rx) = oneshot::channel();
        (Self::Channel(tx), Outcome { rx })
    }

    /// Deliver the terminal outcome.
    pub fn resolve(self, outcome: Result<T, AssistError>) {
        match (self, outcome) {
            (Self::Callbacks { on_result, .. }, Ok(value)) => on_result(value),
            (Self::Callbacks { on_error, .. }, Err(e)) => on_error(e),
            (Self::Channel(tx), outcome) => {
                // Receiver gone means the caller stopped waiting.
                let _ = tx.send(outcome);
            }
        }
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Callbacks { .. } => f.write_str("Completion::Callbacks"),
            Self::Channel(tx) => f
                .debug_struct("Completion::Channel")
                .field("closed", &tx.is_closed())
                .finish(),
        }
    }
}

/// Future resolving to a channel-backed completion's outcome.
#[derive(Debug)]
pub struct Outcome<T> {
    rx: oneshot::Receiver<Result<T, AssistError>>,
}

impl<T> Future for Outcome<T> {
    type Output = Result<T, AssistError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            // Sender dropped without resolving.
            Poll::Ready(Err(_)) => Poll::Ready(Err(AssistError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_callbacks_route_by_outcome() {
        let seen = Arc::new(Mutex::new(Vec::new()));

        let ok_seen = seen.clone();
        let err_seen = seen.clone();
        let completion = Completion::callbacks(
            move |text: String| ok_seen.lock().unwrap().push(format!("ok:{}", text)),
            move |e| err_seen.lock().unwrap().push(format!("err:{}", e)),
        );
        completion.resolve(Ok("Hello".to_string()));

        let err_seen = seen.clone();
        let completion = Completion::callbacks(
            |_: String| panic!("success sink must not run"),
            move |e| err_seen.lock().unwrap().push(format!("err:{}", e)),
        );
        completion.resolve(Err(AssistError::ServerTask("quota".into())));

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["ok:Hello", "err:server task error: quota"]
        );
    }

    #[tokio::test]
    async fn test_channel_delivers_outcome() {
        let (completion, outcome) = Completion::channel();
        completion.resolve(Ok(7u32));
        assert_eq!(outcome.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_dropped_completion_reads_as_cancelled() {
        let (completion, outcome) = Completion::<String>::channel();
        drop(completion);
        assert!(matches!(outcome.await, Err(AssistError::Cancelled)));
    }
}
