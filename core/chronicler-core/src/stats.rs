//! Run statistics for the monitoring pipeline.
//!
//! Counters are reset at the start of each monitoring run and read
//! concurrently by status callers; every task that enters the pipeline is
//! accounted for in exactly one of them.

use std::sync::Mutex;

use serde::Serialize;

/// The outcome classes a pipeline item can be accounted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKind {
    /// Data point stored.
    Processed,
    /// Snapshot quarantined and queued for processing.
    Captured,
    /// Logical duplicate (game day or signature key already seen).
    DuplicateSkipped,
    /// Notification for an unchanged file signature.
    EventDuplicateSkipped,
    /// Extractor recognized the save but could not parse it.
    UnsupportedFormat,
    /// Stabilization, capture, extraction, or persistence failure.
    Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub processed: u64,
    pub captured: u64,
    pub duplicate_skipped: u64,
    pub event_duplicate_skipped: u64,
    pub unsupported_format: u64,
    pub error: u64,
}

impl RunStats {
    fn record(&mut self, kind: StatKind) {
        let counter = match kind {
            StatKind::Processed => &mut self.processed,
            StatKind::Captured => &mut self.captured,
            StatKind::DuplicateSkipped => &mut self.duplicate_skipped,
            StatKind::EventDuplicateSkipped => &mut self.event_duplicate_skipped,
            StatKind::UnsupportedFormat => &mut self.unsupported_format,
            StatKind::Error => &mut self.error,
        };
        *counter = counter.saturating_add(1);
    }
}

/// Thread-safe counter registry shared by both workers and status callers.
#[derive(Debug, Default)]
pub struct StatsRegistry {
    inner: Mutex<RunStats>,
}

impl StatsRegistry {
    pub fn record(&self, kind: StatKind) {
        if let Ok(mut stats) = self.inner.lock() {
            stats.record(kind);
        }
    }

    pub fn snapshot(&self) -> RunStats {
        self.inner
            .lock()
            .map(|stats| *stats)
            .unwrap_or_default()
    }

    pub fn reset(&self) {
        if let Ok(mut stats) = self.inner.lock() {
            *stats = RunStats::default();
        }
    }
}

/// Queue depths for status reporting; readable without blocking the
/// pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BacklogSnapshot {
    pub event_queue: usize,
    pub process_queue: usize,
}
