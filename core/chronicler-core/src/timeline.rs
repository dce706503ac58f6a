//! Campaign timeline derivation.
//!
//! Data points are ordered by a linear game-day count. The count normally
//! comes from the save itself; when the extractor could not recover one,
//! the fallback chain is: a date embedded in the filename, the file's
//! last-modified time, and finally a bare arrival-order marker.

use std::path::Path;
use std::time::UNIX_EPOCH;

use once_cell::sync::Lazy;
use regex::Regex;

use chronicler_extract_protocol::{DataPoint, TimelineSource};

/// First campaign year; day 1 is January 1st of this year.
pub const EPOCH_YEAR: i64 = 1836;

static DATE_STRING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})\.(\d{1,2})\.(\d{1,2})$").expect("date string pattern"));
static FILENAME_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"_(\d{4})_(\d{1,2})_(\d{1,2})(?:_|$)").expect("filename date pattern")
});

/// Converts a calendar date to the linear day count used for sequencing.
///
/// Uses the game's idealized 365-day year and 30-day month; this only has
/// to be monotonic and consistent across sources, not calendar-accurate.
pub fn to_game_day(year: i64, month: i64, day: i64) -> i64 {
    (year - EPOCH_YEAR) * 365 + (month - 1) * 30 + day
}

/// Parses an in-save date of the form `YYYY.M.D`.
pub fn parse_date_string(value: &str) -> Option<(i64, i64, i64)> {
    let captures = DATE_STRING.captures(value.trim())?;
    let year = captures.get(1)?.as_str().parse().ok()?;
    let month = captures.get(2)?.as_str().parse().ok()?;
    let day = captures.get(3)?.as_str().parse().ok()?;
    Some((year, month, day))
}

/// Recovers a `_YYYY_M_D` date embedded in a save file's stem.
pub fn date_from_filename(save_file: &Path) -> Option<(i64, i64, i64)> {
    let stem = save_file.file_stem()?.to_string_lossy().into_owned();
    let captures = FILENAME_DATE.captures(&stem)?;
    let year = captures.get(1)?.as_str().parse().ok()?;
    let month = captures.get(2)?.as_str().parse().ok()?;
    let day = captures.get(3)?.as_str().parse().ok()?;
    Some((year, month, day))
}

/// Fills in the data point's timeline metadata with the configured
/// fallback priority. A primary (in-save) date always wins; derived
/// sources never overwrite fields the extractor already set.
pub fn enrich_metadata(point: &mut DataPoint, source_file: &Path) {
    let metadata = &mut point.metadata;

    if metadata.filename.is_none() {
        metadata.filename = source_file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
    }

    // 1) In-save date: either a game day the extractor computed, or a
    //    date string it recovered.
    if metadata.game_day.is_some() {
        metadata.timeline_source.get_or_insert(TimelineSource::SaveDate);
        return;
    }
    if let Some((year, month, day)) = metadata.date.as_deref().and_then(parse_date_string) {
        metadata.game_day = Some(to_game_day(year, month, day));
        metadata.timeline_source.get_or_insert(TimelineSource::SaveDate);
        return;
    }

    // 2) Filename-derived date, converted with the same epoch formula.
    if let Some((year, month, day)) = date_from_filename(source_file) {
        let date_string = format!("{}.{}.{}", year, month, day);
        let game_day = to_game_day(year, month, day);
        metadata.filename_date = Some(date_string.clone());
        metadata.filename_game_day = Some(game_day);
        if metadata.date.is_none() {
            metadata.date = Some(date_string);
        }
        metadata.game_day = Some(game_day);
        metadata
            .timeline_source
            .get_or_insert(TimelineSource::FilenameDate);
        return;
    }

    // 3) File mtime, then arrival order as the last resort.
    match fs_err::metadata(source_file)
        .and_then(|metadata| metadata.modified())
        .ok()
        .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
    {
        Some(elapsed) => {
            metadata.file_mtime_epoch = Some(elapsed.as_secs_f64());
            metadata.timeline_source = Some(TimelineSource::FileMtime);
        }
        None => {
            metadata.timeline_source = Some(TimelineSource::Index);
        }
    }
}
