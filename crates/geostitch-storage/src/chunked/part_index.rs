//! Part-index extraction and output-filename cleaning.
//!
//! Chunk naming is not standardized across upload paths: the part index may
//! appear as `name.tif.part3`, `name.part-3`, `name_part3.tif`, or the
//! `chunk_000003` form. Each convention is tried in order against the key's
//! filename. A key matching none of them has no recoverable index — callers
//! fail the attempt rather than guess an order.

use std::sync::LazyLock;

use regex::Regex;

use geostitch_core::error::AppError;
use geostitch_core::result::AppResult;

/// Known part-index conventions, most specific first.
static INDEX_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        // name.tif.part3 / name.part-3 / name.part_07
        Regex::new(r"(?i)\.part[._-]?(\d+)$").unwrap(),
        // name_part3.tif / name.part3.tif / name-part-3.tiff
        Regex::new(r"(?i)[._-]part[._-]?(\d+)(?:\.[a-z0-9]+)?$").unwrap(),
        // chunk_000003 / name.chunk3.tif
        Regex::new(r"(?i)chunk[._-]?(\d+)(?:\.[a-z0-9]+)?$").unwrap(),
    ]
});

/// Trailing `.partN` suffix, the generic pattern used for group election
/// and filename cleaning.
static PART_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.part[._-]?\d+$").unwrap());

/// The filename portion of an object key.
pub fn key_filename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Extract the part index encoded in a chunk key, if any convention matches.
pub fn extract_part_index(key: &str) -> Option<u32> {
    let name = key_filename(key);
    for pattern in INDEX_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(name) {
            if let Ok(index) = caps[1].parse::<u32>() {
                return Some(index);
            }
        }
    }
    None
}

/// The base name shared by a `.partN` family, used to group stray chunks
/// by file. Returns `None` for keys without the trailing part suffix.
pub fn part_group_base(key: &str) -> Option<String> {
    let name = key_filename(key);
    if PART_SUFFIX.is_match(name) {
        Some(PART_SUFFIX.replace(name, "").into_owned())
    } else {
        None
    }
}

/// Strip a trailing `.partN` suffix from a filename, if present.
pub fn strip_part_suffix(name: &str) -> String {
    PART_SUFFIX.replace(name, "").into_owned()
}

/// Derive the clean output filename for an assembled file: part suffix
/// removed, `.tif`/`.tiff` extension guaranteed.
pub fn clean_output_filename(original: &str) -> String {
    let stripped = strip_part_suffix(key_filename(original));
    let lower = stripped.to_lowercase();
    if lower.ends_with(".tif") || lower.ends_with(".tiff") {
        stripped
    } else {
        format!("{stripped}.tif")
    }
}

/// Sort chunk keys ascending by their extracted part index.
///
/// With more than one chunk, every key must carry a recoverable index;
/// an unmatched key fails the sort instead of silently landing at index 0
/// and misordering the output.
pub fn sort_chunk_keys(keys: &[String]) -> AppResult<Vec<String>> {
    if keys.len() <= 1 {
        return Ok(keys.to_vec());
    }

    let mut indexed = Vec::with_capacity(keys.len());
    for key in keys {
        let index = extract_part_index(key).ok_or_else(|| {
            AppError::assembly(format!(
                "Cannot determine part index for chunk '{key}'; refusing to guess an order"
            ))
        })?;
        indexed.push((index, key.clone()));
    }

    indexed.sort();
    Ok(indexed.into_iter().map(|(_, key)| key).collect())
}
