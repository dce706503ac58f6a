//! Runtime tuning knobs for the monitor.
//!
//! All durations are plain numbers so the struct deserializes from a TOML
//! or JSON config file; missing fields take their defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Floor for the debounce window; anything shorter races the writer.
const MIN_DEBOUNCE_SECONDS: f64 = 0.2;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    /// How long a file's signature must stay unchanged before it counts
    /// as fully written.
    pub debounce_seconds: f64,
    /// Upper bound on one stabilization wait.
    pub stabilization_timeout_seconds: f64,
    /// Signature polling cadence during stabilization.
    pub poll_interval_ms: u64,
    /// Retry budget for contended copy/move operations.
    pub io_retries: u32,
    pub io_retry_delay_ms: u64,
    /// Queue polling cadence; bounds how quickly stop sentinels are seen.
    pub queue_poll_ms: u64,
    /// Shutdown join bounds for the two workers. The process stage gets
    /// longer since it may sit inside an extractor call.
    pub capture_join_timeout_seconds: u64,
    pub process_join_timeout_seconds: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            debounce_seconds: 1.5,
            stabilization_timeout_seconds: 30.0,
            poll_interval_ms: 200,
            io_retries: 12,
            io_retry_delay_ms: 200,
            queue_poll_ms: 500,
            capture_join_timeout_seconds: 60,
            process_join_timeout_seconds: 120,
        }
    }
}

impl MonitorConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_secs_f64(self.debounce_seconds.max(MIN_DEBOUNCE_SECONDS))
    }

    pub fn stabilization_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.stabilization_timeout_seconds.max(0.0))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn io_retry_delay(&self) -> Duration {
        Duration::from_millis(self.io_retry_delay_ms)
    }

    pub fn queue_poll(&self) -> Duration {
        Duration::from_millis(self.queue_poll_ms)
    }

    pub fn capture_join_timeout(&self) -> Duration {
        Duration::from_secs(self.capture_join_timeout_seconds)
    }

    pub fn process_join_timeout(&self) -> Duration {
        Duration::from_secs(self.process_join_timeout_seconds)
    }
}
