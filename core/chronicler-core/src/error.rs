//! Error types for chronicler-core operations.

use std::path::PathBuf;

/// All errors that can surface from the monitor's public API.
///
/// Per-item pipeline failures (a save that never stabilized, an extractor
/// error, a duplicate) are never represented here: they are converted into
/// run-stat counters and log lines at the stage boundary. Only resource
/// setup and state persistence produce errors for the caller.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Save directory not found at {0}")]
    SaveDirNotFound(PathBuf),

    #[error("Change notifier unavailable: {details}")]
    NotifierUnavailable { details: String },

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl MonitorError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        MonitorError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        MonitorError::Json {
            context: context.into(),
            source,
        }
    }
}

/// Convenience type alias for Results using MonitorError.
pub type Result<T> = std::result::Result<T, MonitorError>;

impl From<MonitorError> for String {
    fn from(err: MonitorError) -> String {
        err.to_string()
    }
}
