//! Storage configuration and path management for chronicler.
//!
//! All output paths are decided in one place so the layout can change
//! without hunting through code, and so tests can inject a temp root.
//!
//! Layout under the data root:
//!
//! ```text
//! <root>/monitor_state.json      dedup ledger (versioned JSON)
//! <root>/queued_saves/<id>/      quarantine: captured snapshots awaiting processing
//! <root>/processed_saves/<id>/   archive: snapshots that completed processing
//! <root>/<id>/data_*.json        persisted data points, one file each
//! ```

use std::path::{Path, PathBuf};

/// Subdirectories of the data root that hold save snapshots rather than
/// playthrough data points.
pub const HOLDING_DIRS: [&str; 2] = ["queued_saves", "processed_saves"];

const STATE_FILE_NAME: &str = "monitor_state.json";

/// Central configuration for all chronicler storage paths.
///
/// Production code uses `StorageConfig::default()` which points to
/// `~/.chronicler/`. Tests use `StorageConfig::with_root(temp_dir)`.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let home = dirs::home_dir().expect("Could not find home directory");
        Self {
            root: home.join(".chronicler"),
        }
    }
}

impl StorageConfig {
    /// Creates a StorageConfig with a custom data root.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the data root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the persisted dedup ledger.
    pub fn state_file(&self) -> PathBuf {
        self.root.join(STATE_FILE_NAME)
    }

    /// Path to the optional TOML config with monitor tuning knobs.
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Quarantine holding area for captured snapshots.
    pub fn queued_saves_dir(&self) -> PathBuf {
        self.root.join("queued_saves")
    }

    /// Archive holding area for processed snapshots.
    pub fn processed_saves_dir(&self) -> PathBuf {
        self.root.join("processed_saves")
    }

    /// Per-playthrough quarantine directory.
    pub fn playthrough_queue_dir(&self, playthrough_id: &str) -> PathBuf {
        self.queued_saves_dir().join(playthrough_id)
    }

    /// Per-playthrough archive directory.
    pub fn playthrough_archive_dir(&self, playthrough_id: &str) -> PathBuf {
        self.processed_saves_dir().join(playthrough_id)
    }

    /// Per-playthrough data point directory.
    pub fn playthrough_data_dir(&self, playthrough_id: &str) -> PathBuf {
        self.root.join(playthrough_id)
    }

    /// Ensures the root and both holding areas exist.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        fs_err::create_dir_all(&self.root)?;
        fs_err::create_dir_all(self.queued_saves_dir())?;
        fs_err::create_dir_all(self.processed_saves_dir())?;
        Ok(())
    }
}
