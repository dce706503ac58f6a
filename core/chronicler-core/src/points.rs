//! Data point persistence and read-back.
//!
//! One JSON file per data point under the playthrough's directory, named
//! by capture timestamp with a numeric suffix on collision. The pipeline
//! only ever appends; read-back exists for reporting callers.

use std::path::PathBuf;

use chrono::Utc;
use tracing::warn;

use chronicler_extract_protocol::DataPoint;

use crate::error::{MonitorError, Result};
use crate::fsops::next_unique_path;
use crate::storage::{StorageConfig, HOLDING_DIRS};

/// Persists one data point, returning the path it was written to.
pub fn save_data_point(
    storage: &StorageConfig,
    playthrough_id: &str,
    point: &DataPoint,
) -> Result<PathBuf> {
    let dir = storage.playthrough_data_dir(playthrough_id);
    fs_err::create_dir_all(&dir)
        .map_err(|err| MonitorError::io("create playthrough data dir", err))?;

    let timestamp = Utc::now().format("%Y%m%d_%H%M%S_%6f");
    let path = next_unique_path(&dir.join(format!("data_{}.json", timestamp)));

    let content = serde_json::to_string_pretty(point)
        .map_err(|err| MonitorError::json("serialize data point", err))?;
    fs_err::write(&path, content).map_err(|err| MonitorError::io("write data point", err))?;

    Ok(path)
}

/// Lists all playthroughs that have any recorded data points.
pub fn list_playthroughs(storage: &StorageConfig) -> Vec<String> {
    let Ok(entries) = fs_err::read_dir(storage.root()) else {
        return Vec::new();
    };

    let mut playthroughs: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| !HOLDING_DIRS.contains(&name.as_str()))
        .collect();
    playthroughs.sort();
    playthroughs
}

/// Loads every data point recorded for a playthrough, in file-name order
/// (which is capture order). Unreadable files are skipped with a warning.
pub fn load_playthrough_points(storage: &StorageConfig, playthrough_id: &str) -> Vec<DataPoint> {
    let dir = storage.playthrough_data_dir(playthrough_id);
    let Ok(entries) = fs_err::read_dir(&dir) else {
        return Vec::new();
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .map(|name| {
                    let name = name.to_string_lossy();
                    name.starts_with("data_") && name.ends_with(".json")
                })
                .unwrap_or(false)
        })
        .collect();
    files.sort();

    let mut points = Vec::with_capacity(files.len());
    for path in files {
        let content = match fs_err::read_to_string(&path) {
            Ok(content) => content,
            Err(err) => {
                warn!(file = %path.display(), error = %err, "Skipping unreadable data point");
                continue;
            }
        };
        match serde_json::from_str::<DataPoint>(&content) {
            Ok(point) => points.push(point),
            Err(err) => {
                warn!(file = %path.display(), error = %err, "Skipping malformed data point");
            }
        }
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn point_with_day(day: i64) -> DataPoint {
        let mut point = DataPoint::default();
        point.metadata.game_day = Some(day);
        point
    }

    #[test]
    fn save_and_load_round_trip() {
        let temp = tempdir().expect("temp dir");
        let storage = StorageConfig::with_root(temp.path());

        save_data_point(&storage, "Belgium", &point_with_day(1)).expect("save");
        save_data_point(&storage, "Belgium", &point_with_day(2)).expect("save");

        let points = load_playthrough_points(&storage, "Belgium");
        assert_eq!(points.len(), 2);
        let days: Vec<_> = points.iter().map(|p| p.metadata.game_day).collect();
        assert!(days.contains(&Some(1)) && days.contains(&Some(2)));
    }

    #[test]
    fn holding_areas_are_not_playthroughs() {
        let temp = tempdir().expect("temp dir");
        let storage = StorageConfig::with_root(temp.path());
        storage.ensure_dirs().expect("dirs");

        save_data_point(&storage, "Belgium", &point_with_day(1)).expect("save");

        assert_eq!(list_playthroughs(&storage), vec!["Belgium".to_string()]);
    }

    #[test]
    fn malformed_points_are_skipped() {
        let temp = tempdir().expect("temp dir");
        let storage = StorageConfig::with_root(temp.path());

        save_data_point(&storage, "Belgium", &point_with_day(1)).expect("save");
        let dir = storage.playthrough_data_dir("Belgium");
        fs_err::write(dir.join("data_zzz.json"), "{broken").expect("write");

        let points = load_playthrough_points(&storage, "Belgium");
        assert_eq!(points.len(), 1);
    }

    #[test]
    fn missing_playthrough_loads_empty() {
        let temp = tempdir().expect("temp dir");
        let storage = StorageConfig::with_root(temp.path());
        assert!(load_playthrough_points(&storage, "nobody").is_empty());
    }
}
