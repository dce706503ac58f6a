//! File signatures and write-stabilization.
//!
//! A signature is the (size, mtime) identity of one version of a file's
//! bytes. Signatures are compared only for equality: two observations with
//! an equal signature are treated as the same content.

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSignature {
    pub size: u64,
    pub mtime_ns: i64,
}

impl FileSignature {
    /// Reads the current signature of `path`, or None if the file is
    /// missing or unreadable.
    pub fn probe(path: &Path) -> Option<FileSignature> {
        let metadata = fs_err::metadata(path).ok()?;
        let modified = metadata.modified().ok()?;
        let mtime_ns = match modified.duration_since(UNIX_EPOCH) {
            Ok(elapsed) => elapsed.as_nanos() as i64,
            Err(before_epoch) => -(before_epoch.duration().as_nanos() as i64),
        };
        Some(FileSignature {
            size: metadata.len(),
            mtime_ns,
        })
    }

    /// Stable string key for the global seen-signature set.
    pub fn key(&self) -> String {
        format!("{}:{}", self.size, self.mtime_ns)
    }

    /// Filename-safe form of [`FileSignature::key`].
    pub fn filename_fragment(&self) -> String {
        format!("{}_{}", self.size, self.mtime_ns)
    }
}

/// Polls `path` until its signature has been unchanged for at least
/// `debounce`, declaring the file fully written.
///
/// If `timeout` elapses first, returns the last-observed signature, which
/// is None when the file vanished (or never appeared) during the wait.
pub fn wait_until_stable(
    path: &Path,
    debounce: Duration,
    timeout: Duration,
    poll_interval: Duration,
) -> Option<FileSignature> {
    let deadline = Instant::now() + timeout;

    let mut previous: Option<FileSignature> = None;
    let mut stable_since: Option<Instant> = None;

    while Instant::now() < deadline {
        let signature = match FileSignature::probe(path) {
            Some(signature) => signature,
            None => {
                previous = None;
                stable_since = None;
                thread::sleep(poll_interval);
                continue;
            }
        };

        if previous == Some(signature) {
            match stable_since {
                Some(since) if since.elapsed() >= debounce => return Some(signature),
                Some(_) => {}
                None => stable_since = Some(Instant::now()),
            }
        } else {
            previous = Some(signature);
            stable_since = Some(Instant::now());
        }

        thread::sleep(poll_interval);
    }

    previous
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn probe_missing_file_returns_none() {
        let temp = tempdir().expect("temp dir");
        assert!(FileSignature::probe(&temp.path().join("absent.v3")).is_none());
    }

    #[test]
    fn key_and_fragment_agree() {
        let signature = FileSignature {
            size: 10,
            mtime_ns: 12345,
        };
        assert_eq!(signature.key(), "10:12345");
        assert_eq!(signature.filename_fragment(), "10_12345");
    }

    #[test]
    fn stable_file_settles_within_debounce() {
        let temp = tempdir().expect("temp dir");
        let path = temp.path().join("save.v3");
        fs_err::write(&path, b"content").expect("write");

        let signature = wait_until_stable(
            &path,
            Duration::from_millis(50),
            Duration::from_secs(5),
            Duration::from_millis(20),
        );

        assert_eq!(signature, FileSignature::probe(&path));
    }

    #[test]
    fn vanished_file_times_out_with_none() {
        let temp = tempdir().expect("temp dir");
        let path = temp.path().join("gone.v3");

        let signature = wait_until_stable(
            &path,
            Duration::from_millis(50),
            Duration::from_millis(200),
            Duration::from_millis(20),
        );

        assert!(signature.is_none());
    }
}
