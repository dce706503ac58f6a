//! Crash-durable dedup ledger for the capture pipeline.
//!
//! # File Format
//!
//! ```json
//! {
//!   "state_version": 3,
//!   "file_signatures": { "<abs path>": { "mtime_ns": 123, "size": 456 } },
//!   "seen_game_days": { "<playthrough>": [1, 2, 3] },
//!   "seen_signature_keys": ["456:123"],
//!   "last_update": "2026-08-06T12:00:00+00:00"
//! }
//! ```
//!
//! # Defensive Design
//!
//! The file may be absent, truncated, or written by an older build, so:
//! - Missing file: empty ledger
//! - Corrupt JSON: empty ledger, log warning
//! - Versions 2 and 3 load with per-entry type checks; malformed entries
//!   are skipped individually rather than failing the whole load
//! - Any other version resets to empty and persists immediately
//!
//! # Durability
//!
//! Every mutating operation flushes the file (temp file + rename) before
//! returning, so state on disk never lags a dedup decision the pipeline
//! has already acted on.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use serde_json::{json, Value};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::error::{MonitorError, Result};
use crate::signature::FileSignature;

pub const STATE_VERSION: u64 = 3;

#[derive(Debug, Default)]
struct Ledger {
    file_signatures: HashMap<String, FileSignature>,
    seen_game_days: HashMap<String, BTreeSet<i64>>,
    seen_signature_keys: BTreeSet<String>,
}

/// Mutex-guarded dedup state shared by both pipeline stages.
///
/// Never hand out the inner collections; all access goes through the
/// synchronized methods below.
#[derive(Debug)]
pub struct SignatureStore {
    ledger: Mutex<Ledger>,
    state_file: PathBuf,
}

impl SignatureStore {
    /// Loads the ledger from `state_file`, migrating or resetting as
    /// described in the module docs.
    pub fn load(state_file: &Path) -> Self {
        let store = SignatureStore {
            ledger: Mutex::new(Ledger::default()),
            state_file: state_file.to_path_buf(),
        };

        if !state_file.exists() {
            return store;
        }

        let content = match fs_err::read_to_string(state_file) {
            Ok(content) => content,
            Err(err) => {
                warn!(error = %err, "Could not read monitor state; starting empty");
                return store;
            }
        };

        let value: Value = match serde_json::from_str(&content) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "Could not parse monitor state; starting empty");
                return store;
            }
        };

        match value.get("state_version").and_then(Value::as_u64) {
            Some(version @ 2..=3) => {
                let ledger = load_v2_v3(&value, version);
                info!(
                    version,
                    file_signatures = ledger.file_signatures.len(),
                    seen_game_days = ledger
                        .seen_game_days
                        .values()
                        .map(BTreeSet::len)
                        .sum::<usize>(),
                    "Loaded monitor state"
                );
                *store.guard() = ledger;
            }
            other => {
                // Deliberately lossy: an unknown or legacy schema is reset
                // to empty rather than partially reinterpreted, which
                // discards prior dedup history.
                warn!(version = ?other, "Unknown monitor state version; resetting");
                if let Err(err) = store.flush() {
                    warn!(error = %err, "Could not persist reset monitor state");
                }
            }
        }

        store
    }

    /// Last stabilized signature recorded for a path key.
    pub fn signature_for(&self, path_key: &str) -> Option<FileSignature> {
        self.guard().file_signatures.get(path_key).copied()
    }

    /// Records the signature under `path_key` and flushes.
    pub fn record_signature(&self, path_key: &str, signature: FileSignature) -> Result<()> {
        {
            let mut ledger = self.guard();
            ledger
                .file_signatures
                .insert(path_key.to_string(), signature);
        }
        self.flush()
    }

    /// Marks a game day as seen for a playthrough. Returns Ok(false) when
    /// the day was already recorded (and nothing was flushed).
    pub fn record_game_day(&self, playthrough_id: &str, game_day: i64) -> Result<bool> {
        {
            let mut ledger = self.guard();
            let days = ledger
                .seen_game_days
                .entry(playthrough_id.to_string())
                .or_default();
            if !days.insert(game_day) {
                return Ok(false);
            }
        }
        self.flush()?;
        Ok(true)
    }

    /// Marks a signature key in the global fallback set. Returns Ok(false)
    /// when the key was already recorded.
    pub fn record_signature_key(&self, key: &str) -> Result<bool> {
        {
            let mut ledger = self.guard();
            if !ledger.seen_signature_keys.insert(key.to_string()) {
                return Ok(false);
            }
        }
        self.flush()?;
        Ok(true)
    }

    /// Clears all dedup state and persists the empty ledger.
    pub fn reset(&self) -> Result<()> {
        {
            let mut ledger = self.guard();
            ledger.file_signatures.clear();
            ledger.seen_game_days.clear();
            ledger.seen_signature_keys.clear();
        }
        self.flush()
    }

    /// Rewrites the state file from the current ledger.
    pub fn flush(&self) -> Result<()> {
        let payload = {
            let ledger = self.guard();
            let signatures: BTreeMap<&String, &FileSignature> =
                ledger.file_signatures.iter().collect();
            let days: BTreeMap<&String, Vec<i64>> = ledger
                .seen_game_days
                .iter()
                .map(|(id, days)| (id, days.iter().copied().collect()))
                .collect();
            json!({
                "state_version": STATE_VERSION,
                "file_signatures": signatures,
                "seen_game_days": days,
                "seen_signature_keys": ledger.seen_signature_keys,
                "last_update": Utc::now().to_rfc3339(),
            })
        };

        let content = serde_json::to_string_pretty(&payload)
            .map_err(|err| MonitorError::json("serialize monitor state", err))?;

        let parent = self.state_file.parent().ok_or_else(|| {
            MonitorError::io(
                "monitor state path has no parent",
                std::io::Error::new(std::io::ErrorKind::NotFound, "no parent directory"),
            )
        })?;
        let mut temp = NamedTempFile::new_in(parent)
            .map_err(|err| MonitorError::io("create temp state file", err))?;
        temp.write_all(content.as_bytes())
            .map_err(|err| MonitorError::io("write temp state file", err))?;
        temp.flush()
            .map_err(|err| MonitorError::io("flush temp state file", err))?;
        temp.persist(&self.state_file)
            .map_err(|err| MonitorError::io("persist monitor state", err.error))?;

        Ok(())
    }

    // A poisoned lock still holds valid ledger data; keep serving it.
    fn guard(&self) -> MutexGuard<'_, Ledger> {
        self.ledger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn load_v2_v3(value: &Value, version: u64) -> Ledger {
    let mut ledger = Ledger::default();

    if let Some(signatures) = value.get("file_signatures").and_then(Value::as_object) {
        for (path_key, raw) in signatures {
            let mtime_ns = raw.get("mtime_ns").and_then(Value::as_i64);
            let size = raw.get("size").and_then(Value::as_u64);
            let (Some(mtime_ns), Some(size)) = (mtime_ns, size) else {
                continue;
            };
            ledger
                .file_signatures
                .insert(path_key.clone(), FileSignature { size, mtime_ns });
        }
    }

    if let Some(seen_days) = value.get("seen_game_days").and_then(Value::as_object) {
        for (playthrough_id, raw_days) in seen_days {
            let Some(raw_days) = raw_days.as_array() else {
                continue;
            };
            let days: BTreeSet<i64> = raw_days.iter().filter_map(Value::as_i64).collect();
            ledger.seen_game_days.insert(playthrough_id.clone(), days);
        }
    }

    if version == 3 {
        if let Some(keys) = value.get("seen_signature_keys").and_then(Value::as_array) {
            ledger.seen_signature_keys = keys
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
        }
    }

    ledger
}
