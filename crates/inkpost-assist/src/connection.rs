//! Push-channel connectivity.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use inkpost_core::ConnectionState;

/// Single source of truth for the push channel's connection state.
///
/// The transport collaborator calls [`TransportState::set`]; everything else
/// reads [`TransportState::current`] or waits on [`TransportState::subscribe`].
/// Clones share the same state.
#[derive(Debug, Clone)]
pub struct TransportState {
    tx: Arc<watch::Sender<ConnectionState>>,
}

impl TransportState {
    /// Create a state starting at `Disconnected`.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::Disconnected);
        Self { tx: Arc::new(tx) }
    }

    /// Current state.
    pub fn current(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    /// Returns true if the push channel accepts sends.
    pub fn is_connected(&self) -> bool {
        self.current() == ConnectionState::Connected
    }

    /// Record a new state and return the previous one.
    ///
    /// Subscribers are only woken when the state actually changes.
    pub fn set(&self, next: ConnectionState) -> ConnectionState {
        let mut previous = next;
        self.tx.send_if_modified(|state| {
            previous = *state;
            if *state == next {
                return false;
            }
            *state = next;
            true
        });
        if previous != next {
            info!(from = %previous, to = %next, "Push channel state changed");
        }
        previous
    }

    /// Receive change notifications.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }
}

impl Default for TransportState {
    fn default() -> Self {
        Self::new()
    }
}
