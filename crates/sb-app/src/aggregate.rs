//! Aggregation pass over a finished run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use sb_results::{
    ARGS_FILE, CMD_FILE, RUN_LOG_FILE, RowEntry, SummaryRow, dir_name, list_grid_dirs,
    list_rep_dirs, parse_grid_suffix, seed_candidates, write_group_report, write_summary,
};
use sb_scrape::{extract_grid, extract_metric, extract_seed_from_candidates};

use crate::error::{AppError, AppResult};

/// A folder left out of the aggregate, with the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedEntry {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct AggregateReport {
    pub run_dir: PathBuf,
    /// One row per grid group, ascending by grid.
    pub groups: Vec<SummaryRow>,
    pub group_reports: Vec<PathBuf>,
    pub tsv_path: PathBuf,
    pub jsonl_path: PathBuf,
    pub skipped: Vec<SkippedEntry>,
}

/// Scrape every replicate of `run_dir`, then write the per-grid text reports
/// and the TSV/JSONL summary.
///
/// Replicates without a metric and grid folders without a usable grid value
/// are skipped with a warning. Report I/O errors abort the pass before the
/// summary files are touched.
pub fn aggregate_run(run_dir: &Path) -> AppResult<AggregateReport> {
    if !run_dir.is_dir() {
        return Err(AppError::NoRunDirectory(format!(
            "{} does not exist",
            run_dir.display()
        )));
    }

    let mut skipped = Vec::new();
    let mut groups: BTreeMap<i64, Vec<RowEntry>> = BTreeMap::new();

    for group_dir in list_grid_dirs(run_dir)? {
        let rep_dirs = match list_rep_dirs(&group_dir) {
            Ok(dirs) => dirs,
            Err(err) => {
                tracing::warn!(dir = %group_dir.display(), error = %err, "[agg] cannot read group folder");
                skipped.push(SkippedEntry {
                    path: group_dir,
                    reason: format!("unreadable: {}", err),
                });
                continue;
            }
        };

        let Some(grid) = group_grid(&group_dir, &rep_dirs) else {
            tracing::warn!(dir = %group_dir.display(), "[agg] no grid value for group folder; skipped");
            skipped.push(SkippedEntry {
                path: group_dir,
                reason: "no grid value".to_string(),
            });
            continue;
        };

        let rows = groups.entry(grid).or_default();
        let before = rows.len();
        for rep_dir in rep_dirs {
            let outcome = extract_metric(&rep_dir.join(RUN_LOG_FILE));
            let Some(metric) = outcome.value() else {
                let note = outcome.note();
                tracing::warn!(rep = %rep_dir.display(), reason = %note, "[agg] replicate skipped");
                skipped.push(SkippedEntry {
                    path: rep_dir,
                    reason: note,
                });
                continue;
            };
            rows.push(RowEntry {
                rep_id: dir_name(&rep_dir),
                seed: extract_seed_from_candidates(&seed_candidates(&rep_dir)),
                metric,
                note: outcome.note(),
            });
        }
        if rows.len() == before {
            tracing::warn!(dir = %group_dir.display(), "[agg] group has no usable replicates");
        }
    }

    groups.retain(|_, rows| !rows.is_empty());
    if groups.is_empty() {
        return Err(AppError::NothingToAggregate {
            path: run_dir.to_path_buf(),
        });
    }

    let mut summary = Vec::with_capacity(groups.len());
    let mut group_reports = Vec::with_capacity(groups.len());
    for (grid, rows) in &groups {
        let report = write_group_report(run_dir, *grid, rows)?;
        let row = report.summary_row();
        tracing::info!(grid, n = row.n, mean = %row.mean_full, "[agg] group summarized");
        group_reports.push(report.path);
        summary.push(row);
    }
    let (tsv_path, jsonl_path) = write_summary(run_dir, &summary)?;

    tracing::info!(
        groups = summary.len(),
        skipped = skipped.len(),
        tsv = %tsv_path.display(),
        "[agg] aggregation finished"
    );

    Ok(AggregateReport {
        run_dir: run_dir.to_path_buf(),
        groups: summary,
        group_reports,
        tsv_path,
        jsonl_path,
        skipped,
    })
}

/// Grid from the `grid_<N>` folder name, else from the first replicate whose
/// side-files carry `--grid`.
fn group_grid(group_dir: &Path, rep_dirs: &[PathBuf]) -> Option<i64> {
    parse_grid_suffix(&dir_name(group_dir)).or_else(|| {
        rep_dirs.iter().find_map(|rep| {
            extract_grid(&rep.join(ARGS_FILE)).or_else(|| extract_grid(&rep.join(CMD_FILE)))
        })
    })
}
