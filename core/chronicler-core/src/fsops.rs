//! Retry-wrapped filesystem operations for contended save files.
//!
//! The save writer holds files open while rewriting them, so copies and
//! moves can hit transient sharing violations. Both helpers retry on a
//! short delay and hand the last error back to the caller.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

pub fn copy_with_retries(
    source: &Path,
    destination: &Path,
    retries: u32,
    delay: Duration,
) -> std::io::Result<()> {
    let mut last_error = None;
    for _ in 0..retries {
        match fs_err::copy(source, destination) {
            Ok(_) => return Ok(()),
            Err(err) => {
                last_error = Some(err);
                thread::sleep(delay);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::Other, "copy retries exhausted")
    }))
}

/// Moves `source` to `destination`, falling back to copy-and-delete when a
/// rename is not possible (the holding areas may live on another
/// filesystem than the watched directory).
pub fn move_with_retries(
    source: &Path,
    destination: &Path,
    retries: u32,
    delay: Duration,
) -> std::io::Result<()> {
    let mut last_error = None;
    for _ in 0..retries {
        match fs_err::rename(source, destination) {
            Ok(()) => return Ok(()),
            Err(rename_error) => {
                match fs_err::copy(source, destination).and_then(|_| fs_err::remove_file(source)) {
                    Ok(()) => return Ok(()),
                    Err(_) => last_error = Some(rename_error),
                }
            }
        }
        thread::sleep(delay);
    }
    Err(last_error.unwrap_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::Other, "move retries exhausted")
    }))
}

/// Returns `path` unchanged if free, otherwise the first
/// `<stem>_<n><ext>` variant that does not exist yet.
pub fn next_unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    let parent = path.parent().unwrap_or_else(|| Path::new(""));

    let mut index = 1;
    loop {
        let candidate = parent.join(format!("{}_{}{}", stem, index, extension));
        if !candidate.exists() {
            return candidate;
        }
        index += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn copy_succeeds_on_first_try() {
        let temp = tempdir().expect("temp dir");
        let source = temp.path().join("a.v3");
        let destination = temp.path().join("b.v3");
        fs_err::write(&source, b"payload").expect("write");

        copy_with_retries(&source, &destination, 3, Duration::from_millis(1)).expect("copy");

        assert!(source.exists());
        assert_eq!(fs_err::read(&destination).expect("read"), b"payload");
    }

    #[test]
    fn move_removes_the_source() {
        let temp = tempdir().expect("temp dir");
        let source = temp.path().join("a.v3");
        let destination = temp.path().join("moved.v3");
        fs_err::write(&source, b"payload").expect("write");

        move_with_retries(&source, &destination, 3, Duration::from_millis(1)).expect("move");

        assert!(!source.exists());
        assert_eq!(fs_err::read(&destination).expect("read"), b"payload");
    }

    #[test]
    fn move_of_missing_source_reports_the_error() {
        let temp = tempdir().expect("temp dir");
        let source = temp.path().join("absent.v3");
        let destination = temp.path().join("moved.v3");

        let result = move_with_retries(&source, &destination, 2, Duration::from_millis(1));

        assert!(result.is_err());
    }

    #[test]
    fn next_unique_path_appends_counters() {
        let temp = tempdir().expect("temp dir");
        let base = temp.path().join("data.json");

        assert_eq!(next_unique_path(&base), base);

        fs_err::write(&base, b"{}").expect("write");
        let first = next_unique_path(&base);
        assert_eq!(first, temp.path().join("data_1.json"));

        fs_err::write(&first, b"{}").expect("write");
        assert_eq!(next_unique_path(&base), temp.path().join("data_2.json"));
    }
}
