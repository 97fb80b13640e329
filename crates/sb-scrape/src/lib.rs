//! sb-scrape: tolerant extraction of metrics and run parameters from
//! replicate logs and argument side-files.
//!
//! Nothing in this crate returns an error: missing files, unreadable files,
//! and garbage lines all degrade to "no value".

pub mod flags;
pub mod metric;

pub use flags::{extract_flag_int, extract_grid, extract_seed, extract_seed_from_candidates};
pub use metric::{MetricOutcome, MetricSource, extract_metric, scan_metric};

use std::path::Path;

/// Read a text file, replacing invalid UTF-8 instead of failing.
pub(crate) fn read_lossy(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Byte offset of `needle` in `haystack`, ignoring ASCII case.
pub(crate) fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .to_ascii_lowercase()
        .find(&needle.to_ascii_lowercase())
}
