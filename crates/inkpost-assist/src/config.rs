//! Assistant configuration.

use std::time::Duration;

use serde::Deserialize;

/// Assistant configuration.
///
/// Every field has a default, so a host application can deserialize a
/// partial JSON document.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssistConfig {
    /// Outbound queue retry policy.
    pub retry: RetryConfig,

    /// Job polling policy.
    pub poll: PollConfig,

    /// Finalized-id guard bounds.
    pub dedup: DedupConfig,

    /// A streaming task with no event for this long fails (milliseconds).
    pub stream_idle_timeout_ms: u64,

    /// How often stale streaming tasks are swept (milliseconds).
    pub sweep_interval_ms: u64,

    /// Capacity of the task update broadcast channel.
    pub update_capacity: usize,
}

impl AssistConfig {
    /// Parse a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_idle_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl Default for AssistConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            poll: PollConfig::default(),
            dedup: DedupConfig::default(),
            stream_idle_timeout_ms: 5 * 60 * 1000,
            sweep_interval_ms: 30 * 1000,
            update_capacity: 256,
        }
    }
}

/// Outbound queue retry configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay after the first failed send (milliseconds).
    pub base_delay_ms: u64,

    /// Upper bound for any retry delay (milliseconds).
    pub max_delay_ms: u64,

    /// Total send attempts before a message fails.
    pub max_attempts: u32,

    /// Number of finished (sent or failed) messages kept for inspection.
    pub history_limit: usize,
}

impl RetryConfig {
    /// Delay before the next attempt after `failures` failed attempts.
    ///
    /// `min(base * 2^(failures - 1), cap)`.
    pub fn delay_after(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            max_delay_ms: 30 * 1000,
            max_attempts: 5,
            history_limit: 256,
        }
    }
}

/// Job polling configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Time between status checks (milliseconds).
    pub interval_ms: u64,

    /// Status checks before giving up.
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            max_attempts: 60,
        }
    }
}

/// Finalized-id guard configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// How long a finalized id stays guarded (milliseconds).
    pub ttl_ms: u64,

    /// Maximum number of guarded ids; the oldest are evicted first.
    pub max_entries: usize,
}

impl DedupConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 10 * 60 * 1000,
            max_entries: 1024,
        }
    }
}
