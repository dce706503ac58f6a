//! Capture stage: raw change notifications in, quarantined snapshots out.
//!
//! For every notification the stage waits for the file to stop changing,
//! drops event-level duplicates by signature, and materializes an
//! immutable copy in quarantine storage before the writer can reuse the
//! slot. Rotating autosave slots are moved out of the watched directory;
//! user-named saves are copied and left in place.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::MonitorConfig;
use crate::fsops::{copy_with_retries, move_with_retries, next_unique_path};
use crate::playthrough::resolve_playthrough;
use crate::signature::{wait_until_stable, FileSignature};
use crate::state::SignatureStore;
use crate::stats::{StatKind, StatsRegistry};
use crate::storage::StorageConfig;

use chronicler_extract_protocol::SAVE_EXTENSION;

/// One captured snapshot, exclusively owned by the pipeline between
/// capture and processing.
#[derive(Debug, Clone)]
pub struct SnapshotTask {
    /// Immutable copy in quarantine storage.
    pub queued_path: PathBuf,
    /// The watched path the notification was for.
    pub source_path: PathBuf,
    pub signature: FileSignature,
    pub playthrough_id: String,
    pub queued_at: DateTime<Utc>,
}

/// Stable key under which a path's last-seen signature is remembered.
pub(crate) fn path_key(path: &Path) -> String {
    fs_err::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

/// True for top-level save files of the watched directory. Defensive
/// filter against a noisy notifier: anything else is ignored outright.
pub(crate) fn is_watch_target(path: &Path, watch_dir: &Path) -> bool {
    let has_extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(SAVE_EXTENSION))
        .unwrap_or(false);
    if !has_extension {
        return false;
    }
    match path.parent() {
        Some(parent) => {
            let parent = fs_err::canonicalize(parent).unwrap_or_else(|_| parent.to_path_buf());
            let watch_dir =
                fs_err::canonicalize(watch_dir).unwrap_or_else(|_| watch_dir.to_path_buf());
            parent == watch_dir
        }
        None => false,
    }
}

/// Autosave slots are rotated by the game and must be moved, not copied.
fn is_rotating_slot(path: &Path) -> bool {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_lowercase().contains("autosave"))
        .unwrap_or(false)
}

pub(crate) struct CaptureStage {
    watch_dir: PathBuf,
    storage: StorageConfig,
    config: MonitorConfig,
    store: Arc<SignatureStore>,
    stats: Arc<StatsRegistry>,
}

impl CaptureStage {
    pub fn new(
        watch_dir: PathBuf,
        storage: StorageConfig,
        config: MonitorConfig,
        store: Arc<SignatureStore>,
        stats: Arc<StatsRegistry>,
    ) -> Self {
        Self {
            watch_dir,
            storage,
            config,
            store,
            stats,
        }
    }

    /// Runs one notification through stabilization, event dedup, and
    /// snapshot capture. Returns the task to enqueue, or None when the
    /// notification was filtered, a duplicate, or failed (failures are
    /// counted here).
    pub fn capture(&self, source_file: &Path, reason: &str) -> Option<SnapshotTask> {
        if !is_watch_target(source_file, &self.watch_dir) {
            return None;
        }
        if !source_file.exists() {
            return None;
        }

        let stable = wait_until_stable(
            source_file,
            self.config.debounce(),
            self.config.stabilization_timeout(),
            self.config.poll_interval(),
        );
        let Some(stable) = stable else {
            self.stats.record(StatKind::Error);
            warn!(
                file = %source_file.display(),
                "Save did not stabilize in time"
            );
            return None;
        };

        let path_key = path_key(source_file);
        if self.store.signature_for(&path_key) == Some(stable) {
            self.stats.record(StatKind::EventDuplicateSkipped);
            return None;
        }

        let playthrough_id = resolve_playthrough(source_file);
        let Some(task) = self.capture_snapshot(source_file, &playthrough_id, stable, reason)
        else {
            self.stats.record(StatKind::Error);
            return None;
        };

        // State write failures are non-fatal: the snapshot is already
        // safely quarantined, dedup just loses one data point of history.
        if let Err(err) = self.store.record_signature(&path_key, stable) {
            warn!(error = %err, "Could not persist signature ledger");
        }

        Some(task)
    }

    fn capture_snapshot(
        &self,
        source_file: &Path,
        playthrough_id: &str,
        signature: FileSignature,
        reason: &str,
    ) -> Option<SnapshotTask> {
        let queue_dir = self.storage.playthrough_queue_dir(playthrough_id);
        if let Err(err) = fs_err::create_dir_all(&queue_dir) {
            warn!(error = %err, "Could not create quarantine directory");
            return None;
        }

        let stem = source_file
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = source_file
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S_%6f");
        let queue_name = format!(
            "{}_{}_{}{}",
            stem,
            timestamp,
            signature.filename_fragment(),
            extension
        );
        let queued_path = next_unique_path(&queue_dir.join(queue_name));

        let mut moved = false;
        if is_rotating_slot(source_file) {
            moved = move_with_retries(
                source_file,
                &queued_path,
                self.config.io_retries,
                self.config.io_retry_delay(),
            )
            .is_ok();
        }

        if !moved {
            if !source_file.exists() {
                warn!(
                    file = %source_file.display(),
                    "Save disappeared before snapshot capture"
                );
                return None;
            }
            if let Err(err) = copy_with_retries(
                source_file,
                &queued_path,
                self.config.io_retries,
                self.config.io_retry_delay(),
            ) {
                warn!(
                    file = %source_file.display(),
                    error = %err,
                    "Could not copy save snapshot"
                );
                return None;
            }
        }

        self.stats.record(StatKind::Captured);
        info!(
            reason,
            source = %source_file.display(),
            queued = %queued_path.display(),
            "Captured save snapshot"
        );

        Some(SnapshotTask {
            queued_path,
            source_path: source_file.to_path_buf(),
            signature,
            playthrough_id: playthrough_id.to_string(),
            queued_at: Utc::now(),
        })
    }
}
