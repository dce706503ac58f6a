//! # chronicler-core
//!
//! Capture-and-processing pipeline for a directory of game save files that
//! an external writer rewrites on a fixed set of names. Turns the raw,
//! racy stream of filesystem change notifications into a clean sequence of
//! exactly-once-processed, uniquely identified data points.
//!
//! ## Design Principles
//!
//! - **Two stages, two queues**: a capture worker stabilizes and quarantines
//!   snapshots; a process worker extracts, deduplicates, and persists them.
//!   Each queue has exactly one consumer.
//! - **Crash-durable decisions**: every dedup decision is flushed to the
//!   versioned state file before the pipeline acts on it.
//! - **No silent drops**: every task that enters the process queue is
//!   accounted for in the run stats exactly once.
//! - **Collaborators behind traits**: content extraction
//!   ([`SaveExtractor`]) and change notification ([`monitor::ChangeNotifier`])
//!   are external; the core never links a watcher or parser directly.

pub mod capture;
pub mod config;
pub mod error;
pub mod fsops;
pub mod monitor;
pub mod playthrough;
pub mod points;
pub mod process;
pub mod signature;
pub mod state;
pub mod stats;
pub mod storage;
pub mod timeline;

pub use chronicler_extract_protocol::{
    DataPoint, ExtractError, PointMetadata, SaveExtractor, TimelineSource, SAVE_EXTENSION,
};

pub use capture::SnapshotTask;
pub use config::MonitorConfig;
pub use error::{MonitorError, Result};
pub use monitor::{ChangeNotifier, SaveMonitor};
pub use playthrough::resolve_playthrough;
pub use signature::FileSignature;
pub use state::SignatureStore;
pub use stats::{BacklogSnapshot, RunStats, StatsRegistry};
pub use storage::StorageConfig;
