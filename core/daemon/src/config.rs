//! Monitor config loading.
//!
//! An explicit `--config` path wins; otherwise the data root's
//! `config.toml` is used when present, and defaults apply when it is not.

use std::path::PathBuf;

use chronicler_core::{MonitorConfig, StorageConfig};

pub fn load_monitor_config(
    path: Option<PathBuf>,
    storage: &StorageConfig,
) -> Result<MonitorConfig, String> {
    let config_path = match path {
        Some(path) => path,
        None => storage.config_file(),
    };

    if !config_path.exists() {
        return Ok(MonitorConfig::default());
    }

    let content = fs_err::read_to_string(&config_path).map_err(|err| {
        format!(
            "Failed to read config {}: {}",
            config_path.display(),
            err
        )
    })?;
    toml::from_str::<MonitorConfig>(&content).map_err(|err| {
        format!(
            "Failed to parse config {}: {}",
            config_path.display(),
            err
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let temp = tempdir().expect("temp dir");
        let storage = StorageConfig::with_root(temp.path());

        let config = load_monitor_config(None, &storage).expect("load");

        assert_eq!(config.io_retries, MonitorConfig::default().io_retries);
    }

    #[test]
    fn explicit_path_is_parsed() {
        let temp = tempdir().expect("temp dir");
        let storage = StorageConfig::with_root(temp.path());
        let path = temp.path().join("tuning.toml");
        fs_err::write(
            &path,
            "debounce_seconds = 0.5\nio_retries = 3\n",
        )
        .expect("write");

        let config = load_monitor_config(Some(path), &storage).expect("load");

        assert_eq!(config.debounce_seconds, 0.5);
        assert_eq!(config.io_retries, 3);
    }

    #[test]
    fn malformed_config_is_an_error() {
        let temp = tempdir().expect("temp dir");
        let storage = StorageConfig::with_root(temp.path());
        let path = temp.path().join("tuning.toml");
        fs_err::write(&path, "debounce_seconds = \"soon\"").expect("write");

        assert!(load_monitor_config(Some(path), &storage).is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let temp = tempdir().expect("temp dir");
        let storage = StorageConfig::with_root(temp.path());
        let path = storage.config_file();
        fs_err::create_dir_all(temp.path()).expect("dirs");
        fs_err::write(&path, "debounce_secondz = 1.0\n").expect("write");

        assert!(load_monitor_config(None, &storage).is_err());
    }
}
