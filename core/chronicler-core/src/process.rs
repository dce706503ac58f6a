//! Process stage: quarantined snapshots in, persisted data points out.
//!
//! Strictly serialized: at most one extractor call is ever in flight.
//! Every task is accounted for in the run stats exactly once (processed,
//! duplicate, unsupported format, or error), and the quarantined file is
//! archived afterwards, or left in quarantine for inspection when
//! extraction failed.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use chronicler_extract_protocol::{ExtractError, SaveExtractor};

use crate::capture::SnapshotTask;
use crate::config::MonitorConfig;
use crate::fsops::{move_with_retries, next_unique_path};
use crate::points::save_data_point;
use crate::state::SignatureStore;
use crate::stats::{StatKind, StatsRegistry};
use crate::storage::StorageConfig;
use crate::timeline::enrich_metadata;

pub(crate) struct ProcessStage {
    storage: StorageConfig,
    config: MonitorConfig,
    store: Arc<SignatureStore>,
    stats: Arc<StatsRegistry>,
    extractor: Arc<dyn SaveExtractor>,
}

impl ProcessStage {
    pub fn new(
        storage: StorageConfig,
        config: MonitorConfig,
        store: Arc<SignatureStore>,
        stats: Arc<StatsRegistry>,
        extractor: Arc<dyn SaveExtractor>,
    ) -> Self {
        Self {
            storage,
            config,
            store,
            stats,
            extractor,
        }
    }

    /// Processes one captured snapshot. Returns true when a new data
    /// point was stored.
    pub fn process(&self, task: &SnapshotTask, reason: &str) -> bool {
        let save_file = &task.queued_path;
        if !save_file.exists() {
            self.stats.record(StatKind::Error);
            warn!(file = %save_file.display(), "Queued snapshot is missing");
            return false;
        }

        let mut point = match self.extractor.extract(save_file, &task.playthrough_id) {
            Ok(point) => point,
            Err(ExtractError::RuntimeUnavailable(details)) => {
                self.stats.record(StatKind::Error);
                warn!(
                    file = %save_file.display(),
                    details,
                    "Extractor runtime unavailable; will retry on future saves"
                );
                return false;
            }
            Err(ExtractError::UnsupportedFormat(details)) => {
                self.stats.record(StatKind::UnsupportedFormat);
                warn!(
                    file = %save_file.display(),
                    details,
                    "Save skipped; monitoring continues"
                );
                return false;
            }
            Err(err) => {
                self.stats.record(StatKind::Error);
                warn!(file = %save_file.display(), error = %err, "Extraction failed");
                return false;
            }
        };

        enrich_metadata(&mut point, &task.source_path);
        let game_day = point.metadata.game_day;

        let newly_recorded = match game_day {
            Some(day) => self
                .store
                .record_game_day(&task.playthrough_id, day)
                .unwrap_or_else(|err| {
                    warn!(error = %err, "Could not persist seen game day");
                    true
                }),
            None => self
                .store
                .record_signature_key(&task.signature.key())
                .unwrap_or_else(|err| {
                    warn!(error = %err, "Could not persist seen signature key");
                    true
                }),
        };

        let mut data_recorded = false;
        if newly_recorded {
            match save_data_point(&self.storage, &task.playthrough_id, &point) {
                Ok(path) => {
                    self.stats.record(StatKind::Processed);
                    data_recorded = true;
                    debug!(file = %path.display(), "Stored data point");
                }
                Err(err) => {
                    self.stats.record(StatKind::Error);
                    warn!(error = %err, "Could not store data point");
                }
            }
        } else {
            self.stats.record(StatKind::DuplicateSkipped);
            match game_day {
                Some(day) => info!(
                    file = %task.source_path.display(),
                    game_day = day,
                    "Skipping duplicate game day"
                ),
                None => info!(
                    file = %task.source_path.display(),
                    "Skipping duplicate signature"
                ),
            }
        }

        // The snapshot leaves quarantine whether or not it was a
        // duplicate; only extraction failures keep it around.
        self.archive_snapshot(task, game_day);

        if data_recorded {
            info!(reason, file = %task.source_path.display(), "Processed save");
        }
        data_recorded
    }

    /// Moves the quarantined snapshot into per-playthrough archive
    /// storage. Failure is a warning, not a processing failure.
    fn archive_snapshot(&self, task: &SnapshotTask, game_day: Option<i64>) {
        let save_file = &task.queued_path;
        if !save_file.exists() {
            return;
        }

        let archive_dir = self.storage.playthrough_archive_dir(&task.playthrough_id);
        if let Err(err) = fs_err::create_dir_all(&archive_dir) {
            warn!(error = %err, "Could not create archive directory");
            return;
        }

        let stem = task
            .source_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = save_file
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S_%6f");
        let archive_name = match game_day {
            Some(day) => format!("{}_day{}_{}{}", stem, day, timestamp, extension),
            None => format!("{}_{}{}", stem, timestamp, extension),
        };
        let destination = next_unique_path(&archive_dir.join(archive_name));

        match move_with_retries(
            save_file,
            &destination,
            self.config.io_retries,
            self.config.io_retry_delay(),
        ) {
            Ok(()) => info!(file = %destination.display(), "Archived save snapshot"),
            Err(err) => warn!(
                file = %save_file.display(),
                error = %err,
                "Could not archive save snapshot"
            ),
        }
    }
}
