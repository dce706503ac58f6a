//! Built-in extractor that records file facts only.
//!
//! Content interpretation belongs to extractor plugins; this keeps the
//! daemon usable on its own by producing minimal data points whose
//! timeline the core derives from filenames and modification times.

use std::path::Path;

use serde_json::json;

use chronicler_core::{DataPoint, ExtractError, SaveExtractor};

pub struct FileFactsExtractor;

impl SaveExtractor for FileFactsExtractor {
    fn extract(&self, save_file: &Path, playthrough_id: &str) -> Result<DataPoint, ExtractError> {
        let metadata =
            fs_err::metadata(save_file).map_err(|err| ExtractError::Failed(err.to_string()))?;

        let mut point = DataPoint::default();
        point
            .body
            .insert("file_size".to_string(), json!(metadata.len()));
        point
            .body
            .insert("playthrough".to_string(), json!(playthrough_id));
        Ok(point)
    }
}
