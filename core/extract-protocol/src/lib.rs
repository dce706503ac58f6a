//! Extraction contract for the chronicler save monitor.
//!
//! This crate is shared by the monitor core and extractor implementations to
//! prevent schema drift. The monitor only ever reads and writes the metadata
//! sub-record of a [`DataPoint`]; everything else an extractor returns is
//! carried as an opaque blob and persisted verbatim.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// File extension (without the dot) of watched save files.
pub const SAVE_EXTENSION: &str = "v3";

/// Where a data point's position on the campaign timeline came from.
///
/// Ordered by reliability: `SaveDate` is authoritative, `Index` carries no
/// absolute meaning and only preserves arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineSource {
    SaveDate,
    FilenameDate,
    FileMtime,
    Index,
}

/// Timeline and provenance metadata attached to every data point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointMetadata {
    /// In-game date in `YYYY.M.D` form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Linear day count since the campaign epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_day: Option<i64>,
    /// Name of the save file this point was extracted from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline_source: Option<TimelineSource>,
    /// Date recovered from the filename, when the save itself carried none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename_game_day: Option<i64>,
    /// Last-modified time of the source file, epoch seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_mtime_epoch: Option<f64>,
}

/// One extracted record. The `metadata` sub-record is owned by the monitor;
/// the flattened body round-trips untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    #[serde(default)]
    pub metadata: PointMetadata,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

/// Failure classification for extractor invocations. The monitor handles
/// each kind exhaustively at the processing-stage boundary; none of them
/// aborts the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// The extractor's runtime dependency is missing or not ready. It may
    /// recover later, so the monitor keeps running for future snapshots.
    #[error("extractor runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// The snapshot was recognized but its content could not be parsed.
    #[error("unsupported save format: {0}")]
    UnsupportedFormat(String),

    /// Any other extraction failure.
    #[error("extraction failed: {0}")]
    Failed(String),
}

/// The content-extraction collaborator invoked once per captured snapshot.
///
/// Implementations must tolerate being handed a quarantined copy of the
/// save rather than the original path. Invocations are strictly serialized
/// by the monitor; `Sync` is only required for ownership plumbing.
pub trait SaveExtractor: Send + Sync {
    fn extract(&self, save_file: &Path, playthrough_id: &str) -> Result<DataPoint, ExtractError>;
}

impl<F> SaveExtractor for F
where
    F: Fn(&Path, &str) -> Result<DataPoint, ExtractError> + Send + Sync,
{
    fn extract(&self, save_file: &Path, playthrough_id: &str) -> Result<DataPoint, ExtractError> {
        self(save_file, playthrough_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_point_round_trips_with_flattened_body() {
        let mut point = DataPoint::default();
        point.metadata.game_day = Some(42);
        point.metadata.timeline_source = Some(TimelineSource::SaveDate);
        point
            .body
            .insert("gdp".to_string(), serde_json::json!(123.5));

        let encoded = serde_json::to_string(&point).expect("serialize");
        let decoded: DataPoint = serde_json::from_str(&encoded).expect("deserialize");

        assert_eq!(decoded, point);
        assert_eq!(decoded.body.get("gdp"), Some(&serde_json::json!(123.5)));
    }

    #[test]
    fn timeline_source_uses_snake_case_tags() {
        let encoded = serde_json::to_string(&TimelineSource::FilenameDate).expect("serialize");
        assert_eq!(encoded, "\"filename_date\"");
        let decoded: TimelineSource =
            serde_json::from_str("\"file_mtime\"").expect("deserialize");
        assert_eq!(decoded, TimelineSource::FileMtime);
    }

    #[test]
    fn metadata_omits_absent_fields() {
        let point = DataPoint::default();
        let encoded = serde_json::to_string(&point).expect("serialize");
        assert_eq!(encoded, "{\"metadata\":{}}");
    }

    #[test]
    fn unknown_body_fields_are_preserved() {
        let raw = r#"{"metadata":{"game_day":7},"population":1000,"nested":{"a":1}}"#;
        let point: DataPoint = serde_json::from_str(raw).expect("deserialize");
        assert_eq!(point.metadata.game_day, Some(7));
        assert!(point.body.contains_key("population"));
        assert!(point.body.contains_key("nested"));
    }
}
