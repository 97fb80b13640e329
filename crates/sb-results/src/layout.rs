//! Run directory layout: `root/run_<stamp>/grid_<N>/rep_<NNN>/`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Local;

use crate::{ResultsError, ResultsResult};

pub const RUN_PREFIX: &str = "run_";
pub const GRID_PREFIX: &str = "grid_";
pub const REP_PREFIX: &str = "rep_";

pub const RUN_INFO_FILE: &str = "_run_info.txt";
pub const ARGS_FILE: &str = "args.txt";
pub const RUN_ARGS_FILE: &str = "run_args.txt";
pub const CMD_FILE: &str = "cmd.txt";
pub const HOST_LOG_FILE: &str = "host.log";
pub const RUN_LOG_FILE: &str = "run.log";
pub const PREVIEW_FILE: &str = "launch_preview.txt";
pub const SUMMARY_TSV_FILE: &str = "aggregate_summary.tsv";
pub const SUMMARY_JSONL_FILE: &str = "aggregate_summary.jsonl";

/// Runs root directory holding `run_*` folders.
#[derive(Debug, Clone)]
pub struct RunLayout {
    root: PathBuf,
}

impl RunLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create `run_<YYYYMMDD_HHMMSS>` with a `_run_info.txt` marker.
    pub fn create_run(&self) -> ResultsResult<PathBuf> {
        fs::create_dir_all(&self.root)?;

        let now = Local::now();
        let run_dir = self
            .root
            .join(format!("{}{}", RUN_PREFIX, sb_core::format_run_stamp(&now)));
        fs::create_dir_all(&run_dir)?;

        let info = format!(
            "Run created: {}\nRuns root:   {}\n",
            sb_core::format_timestamp(&now),
            self.root.display()
        );
        fs::write(run_dir.join(RUN_INFO_FILE), info)?;

        tracing::info!(run = %run_dir.display(), "created run directory");
        Ok(run_dir)
    }

    /// `run_*` directories sorted by name. A missing root yields no runs.
    pub fn list_runs(&self) -> ResultsResult<Vec<PathBuf>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut runs = child_dirs_with_prefix(&self.root, RUN_PREFIX)?;
        runs.sort_by_key(|p| dir_name(p));
        Ok(runs)
    }

    /// Most recently created run, ties broken by name descending.
    pub fn newest_run(&self) -> ResultsResult<Option<PathBuf>> {
        let runs = self.list_runs()?;
        let newest = runs
            .into_iter()
            .map(|path| (created_at(&path), dir_name(&path), path))
            .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
            .map(|(_, _, path)| path);
        Ok(newest)
    }
}

pub fn grid_dir(run_dir: &Path, grid: &str) -> PathBuf {
    run_dir.join(format!("{}{}", GRID_PREFIX, grid))
}

pub fn rep_dir_name(index: u32) -> String {
    format!("{}{:03}", REP_PREFIX, index)
}

/// Numeric suffix of a `rep_NNN` name.
pub fn parse_rep_index(name: &str) -> Option<u32> {
    strip_prefix_ignore_case(name, REP_PREFIX)?.parse().ok()
}

/// Numeric suffix of a `grid_N` name.
pub fn parse_grid_suffix(name: &str) -> Option<i64> {
    sb_core::parse_i64(strip_prefix_ignore_case(name, GRID_PREFIX)?)
}

/// One past the highest existing `rep_NNN` index under `group_dir`.
///
/// Gaps are not reused (`rep_001`, `rep_003` gives 4). A missing or
/// unreadable folder yields 1. Fails once `rep_4294967295` exists.
pub fn next_rep_index(group_dir: &Path) -> ResultsResult<u32> {
    let entries = match fs::read_dir(group_dir) {
        Ok(entries) => entries,
        Err(err) => {
            if group_dir.exists() {
                tracing::warn!(dir = %group_dir.display(), error = %err, "cannot scan replicate folders; starting at 1");
            }
            return Ok(1);
        }
    };

    let highest = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| parse_rep_index(&entry.file_name().to_string_lossy()))
        .max();
    match highest {
        None => Ok(1),
        Some(max) => max.checked_add(1).ok_or_else(|| ResultsError::RepIndexExhausted {
            dir: group_dir.to_path_buf(),
        }),
    }
}

/// Create `count` consecutive replicate directories starting at `start`.
///
/// Nothing is created when the range would run past `u32::MAX`.
pub fn create_rep_dirs(group_dir: &Path, start: u32, count: u32) -> ResultsResult<Vec<PathBuf>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let last = start
        .checked_add(count - 1)
        .ok_or_else(|| ResultsError::RepIndexExhausted {
            dir: group_dir.to_path_buf(),
        })?;

    let mut dirs = Vec::with_capacity(count as usize);
    for index in start..=last {
        let dir = group_dir.join(rep_dir_name(index));
        fs::create_dir_all(&dir)?;
        dirs.push(dir);
    }
    Ok(dirs)
}

/// `grid_*` folders of a run, ordered by name ignoring case.
pub fn list_grid_dirs(run_dir: &Path) -> ResultsResult<Vec<PathBuf>> {
    let mut dirs = child_dirs_with_prefix(run_dir, GRID_PREFIX)?;
    dirs.sort_by_key(|p| dir_name(p).to_ascii_lowercase());
    Ok(dirs)
}

/// `rep_*` folders of a grid group, ordered by name ignoring case.
pub fn list_rep_dirs(group_dir: &Path) -> ResultsResult<Vec<PathBuf>> {
    let mut dirs = child_dirs_with_prefix(group_dir, REP_PREFIX)?;
    dirs.sort_by_key(|p| dir_name(p).to_ascii_lowercase());
    Ok(dirs)
}

/// Files searched for a seed, in priority order.
pub fn seed_candidates(rep_dir: &Path) -> [PathBuf; 4] {
    [
        rep_dir.join(ARGS_FILE),
        rep_dir.join(RUN_ARGS_FILE),
        rep_dir.join(CMD_FILE),
        rep_dir.join(RUN_LOG_FILE),
    ]
}

pub fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn child_dirs_with_prefix(dir: &Path, prefix: &str) -> ResultsResult<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir()
            && strip_prefix_ignore_case(&entry.file_name().to_string_lossy(), prefix).is_some()
        {
            dirs.push(path);
        }
    }
    Ok(dirs)
}

fn strip_prefix_ignore_case<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    let head = name.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &name[prefix.len()..])
}

fn created_at(path: &Path) -> Option<SystemTime> {
    let meta = fs::metadata(path).ok()?;
    meta.created().or_else(|_| meta.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_and_suffixes() {
        assert_eq!(rep_dir_name(7), "rep_007");
        assert_eq!(rep_dir_name(1234), "rep_1234");
        assert_eq!(parse_rep_index("rep_012"), Some(12));
        assert_eq!(parse_rep_index("REP_3"), Some(3));
        assert_eq!(parse_rep_index("rep_x"), None);
        assert_eq!(parse_rep_index("re"), None);
        assert_eq!(parse_grid_suffix("grid_256"), Some(256));
        assert_eq!(parse_grid_suffix("Grid_64"), Some(64));
        assert_eq!(parse_grid_suffix("grid_fine"), None);
    }

    #[test]
    fn missing_group_starts_at_one() {
        let dir = std::env::temp_dir().join("sb_results_no_such_group_dir");
        assert_eq!(next_rep_index(&dir).unwrap(), 1);
    }

    #[test]
    fn replicate_range_past_u32_max_is_refused() {
        let dir = std::env::temp_dir().join("sb_results_rep_range_limit");
        assert!(matches!(
            create_rep_dirs(&dir, u32::MAX, 2),
            Err(ResultsError::RepIndexExhausted { .. })
        ));
        assert!(!dir.exists());
        assert!(create_rep_dirs(&dir, 5, 0).unwrap().is_empty());
    }
}
