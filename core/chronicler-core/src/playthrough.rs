//! Playthrough identification.
//!
//! Many source filenames (rotating autosave slots, dated backups, numbered
//! manual saves) belong to one long-running campaign. The resolver maps a
//! save filename to that campaign's canonical id by stripping everything
//! the writer varies between snapshots.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

/// Grouping id used when nothing of the filename survives normalization.
pub const DEFAULT_PLAYTHROUGH: &str = "campaign";

static ROTATION_TOKENS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)_?(autosave|backup)").expect("rotation token pattern"));
static EMBEDDED_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_\d{4}_\d{1,2}_\d{1,2}").expect("embedded date pattern"));
static BARE_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"_\d{4}").expect("bare year pattern"));
static TRAILING_COUNTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_\d+$").expect("trailing counter pattern"));
static SEPARATOR_RUNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_+").expect("separator run pattern"));

/// Resolves the canonical playthrough id for a save file.
///
/// Two filenames differing only in rotation suffix, embedded date, or
/// trailing counter resolve to the same id.
pub fn resolve_playthrough(save_file: &Path) -> String {
    let stem = save_file
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    let name = ROTATION_TOKENS.replace_all(&stem, "");
    let name = EMBEDDED_DATE.replace_all(&name, "");
    let name = BARE_YEAR.replace_all(&name, "");
    let name = TRAILING_COUNTER.replace(&name, "");
    let name = SEPARATOR_RUNS.replace_all(&name, "_");
    let name = name.trim_matches('_');

    if name.is_empty() {
        DEFAULT_PLAYTHROUGH.to_string()
    } else {
        name.to_string()
    }
}
