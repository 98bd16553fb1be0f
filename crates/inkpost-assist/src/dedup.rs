//! Bounded set of finalized task ids.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::time::Instant;

use inkpost_core::CorrelationId;

use crate::config::DedupConfig;

/// Remembers which correlation ids have reached a terminal state so that
/// duplicate or late events for them are inert.
///
/// Entries expire after `ttl` and the oldest are evicted once more than
/// `max_entries` are held. Callers pass `now` explicitly.
#[derive(Debug)]
pub struct DedupGuard {
    ttl: Duration,
    max_entries: usize,
    entries: HashMap<CorrelationId, Instant>,
    /// Insertion order. May hold superseded pairs; those are skipped when
    /// their timestamp no longer matches `entries`.
    order: VecDeque<(CorrelationId, Instant)>,
}

impl DedupGuard {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn from_config(config: &DedupConfig) -> Self {
        Self::new(config.ttl(), config.max_entries)
    }

    /// Returns true if `id` is guarded.
    pub fn contains(&self, id: &CorrelationId) -> bool {
        self.entries.contains_key(id)
    }

    /// Guard `id`, finalized at `now`. Returns ids evicted by the size cap.
    pub fn insert(&mut self, id: CorrelationId, now: Instant) -> Vec<CorrelationId> {
        self.entries.insert(id.clone(), now);
        self.order.push_back((id, now));

        let mut evicted = Vec::new();
        while self.entries.len() > self.max_entries {
            match self.order.pop_front() {
                Some((old, at)) => {
                    if self.entries.get(&old) == Some(&at) {
                        self.entries.remove(&old);
                        evicted.push(old);
                    }
                }
                None => break,
            }
        }
        evicted
    }

    /// Stop guarding `id`. Returns true if it was guarded.
    pub fn remove(&mut self, id: &CorrelationId) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Drop entries older than the TTL. Returns the expired ids.
    pub fn purge_expired(&mut self, now: Instant) -> Vec<CorrelationId> {
        let mut expired = Vec::new();
        while let Some((_, at)) = self.order.front() {
            if now.saturating_duration_since(*at) < self.ttl {
                break;
            }
            if let Some((id, at)) = self.order.pop_front() {
                if self.entries.get(&id) == Some(&at) {
                    self.entries.remove(&id);
                    expired.push(id);
                }
            }
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> CorrelationId {
        CorrelationId::new(s)
    }

    #[test]
    fn test_insert_and_contains() {
        let mut guard = DedupGuard::new(Duration::from_secs(60), 10);
        let now = Instant::now();

        assert!(guard.insert(id("t1"), now).is_empty());
        assert!(guard.contains(&id("t1")));
        assert!(!guard.contains(&id("t2")));
    }

    #[test]
    fn test_size_cap_evicts_oldest_first() {
        let mut guard = DedupGuard::new(Duration::from_secs(60), 2);
        let now = Instant::now();

        guard.insert(id("a"), now);
        guard.insert(id("b"), now + Duration::from_millis(1));
        let evicted = guard.insert(id("c"), now + Duration::from_millis(2));

        assert_eq!(evicted, vec![id("a")]);
        assert_eq!(guard.len(), 2);
        assert!(!guard.contains(&id("a")));
        assert!(guard.contains(&id("c")));
    }

    #[test]
    fn test_ttl_expiry() {
        let mut guard = DedupGuard::new(Duration::from_secs(10), 100);
        let start = Instant::now();

        guard.insert(id("old"), start);
        guard.insert(id("new"), start + Duration::from_secs(8));

        assert!(guard.purge_expired(start + Duration::from_secs(9)).is_empty());
        let expired = guard.purge_expired(start + Duration::from_secs(10));
        assert_eq!(expired, vec![id("old")]);
        assert!(guard.contains(&id("new")));
    }

    #[test]
    fn test_reinsert_refreshes_timestamp() {
        let mut guard = DedupGuard::new(Duration::from_secs(10), 100);
        let start = Instant::now();

        guard.insert(id("t1"), start);
        guard.insert(id("t1"), start + Duration::from_secs(5));

        // The superseded pair from `start` must not expire the refreshed entry.
        assert!(guard.purge_expired(start + Duration::from_secs(12)).is_empty());
        assert!(guard.contains(&id("t1")));
        assert_eq!(guard.len(), 1);
    }

    #[test]
    fn test_removed_id_is_not_reported_as_expired() {
        let mut guard = DedupGuard::new(Duration::from_secs(1), 100);
        let start = Instant::now();

        guard.insert(id("t1"), start);
        assert!(guard.remove(&id("t1")));
        assert!(guard.is_empty());
        assert!(guard.purge_expired(start + Duration::from_secs(5)).is_empty());
    }
}
