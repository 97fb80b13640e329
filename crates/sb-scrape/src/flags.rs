//! `--flag value` / `--flag=value` extraction from argument side-files.

use std::path::Path;

use sb_core::parse_i64;

use crate::{find_ignore_case, read_lossy};

/// First integer following `flag` (case-insensitive) in `path`.
///
/// Lines whose value is missing or malformed are skipped; a missing or
/// unreadable file yields `None`.
pub fn extract_flag_int(path: &Path, flag: &str) -> Option<i64> {
    let content = read_lossy(path).ok()?;
    content.lines().find_map(|line| flag_value(line, flag))
}

pub fn extract_seed(path: &Path) -> Option<i64> {
    extract_flag_int(path, "--seed")
}

pub fn extract_grid(path: &Path) -> Option<i64> {
    extract_flag_int(path, "--grid")
}

/// Seed from the first candidate file (in priority order) that yields one.
pub fn extract_seed_from_candidates<P: AsRef<Path>>(candidates: &[P]) -> Option<i64> {
    candidates.iter().find_map(|p| extract_seed(p.as_ref()))
}

fn flag_value(line: &str, flag: &str) -> Option<i64> {
    let idx = find_ignore_case(line, flag)?;
    let tail = &line[idx + flag.len()..];
    tail.split(|c: char| c.is_whitespace() || c == '=')
        .find(|token| !token.is_empty())
        .and_then(parse_i64)
}
