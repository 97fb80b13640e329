//! Per-group text reports and the TSV/JSONL run summary.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sb_core::{format_full, format_seed, timestamp_now};
use sb_stats::{Accumulator, StatsResult};

use crate::layout::{SUMMARY_JSONL_FILE, SUMMARY_TSV_FILE};
use crate::types::{RowEntry, SummaryRow};
use crate::{ResultsError, ResultsResult};

pub const SUMMARY_TSV_HEADER: &str = "grid\tstat\tmean_full\tstderr_full\tn\tmean_pm_pretty";

/// A written `aggregate_grid_<N>.txt` and the statistics it shows.
#[derive(Debug, Clone)]
pub struct GroupReport {
    pub grid: i64,
    pub path: PathBuf,
    pub stats: StatsResult,
}

impl GroupReport {
    pub fn summary_row(&self) -> SummaryRow {
        SummaryRow::from_stats(self.grid, &self.stats)
    }
}

/// Write `aggregate_grid_<grid>.txt` into `run_dir`.
///
/// Statistics are computed from the same rows that are listed, so the text
/// report and the summary built from the returned stats always agree.
pub fn write_group_report(run_dir: &Path, grid: i64, rows: &[RowEntry]) -> ResultsResult<GroupReport> {
    if rows.is_empty() {
        return Err(ResultsError::EmptyGroup { grid });
    }

    let stats = rows.iter().map(|r| r.metric).collect::<Accumulator>().result();

    let mut out = format!(
        "# Aggregate over replicates (grouped by grid)\n# run: {}\n# group (grid): {}\n# generated: {}\n\nrep\tseed\tmetric\t(note)\n",
        run_dir.display(),
        grid,
        timestamp_now()
    );
    for row in rows {
        out.push_str(&format!(
            "{}\t{}\t{}\t{}\n",
            row.rep_id,
            format_seed(row.seed),
            format_full(row.metric),
            row.note
        ));
    }
    out.push_str(&format!(
        "\nn = {}\nmean = {}\nstddev (sample) = {}\nstderr = {}\n95% CI = mean ± {}\n",
        stats.n,
        format_full(stats.mean),
        format_full(stats.sample_stdev),
        format_full(stats.stderr),
        format_full(stats.ci95)
    ));

    let path = run_dir.join(format!("aggregate_grid_{}.txt", grid));
    fs::write(&path, out)?;
    tracing::info!(grid, n = stats.n, path = %path.display(), "wrote group report");

    Ok(GroupReport { grid, path, stats })
}

/// Write `aggregate_summary.tsv` and `aggregate_summary.jsonl` for `rows`.
///
/// Both files are staged as `*.tmp` next to their targets and renamed into
/// place only after both were written, so a failure leaves any previous
/// summary untouched. Returns the TSV and JSONL paths.
pub fn write_summary(run_dir: &Path, rows: &[SummaryRow]) -> ResultsResult<(PathBuf, PathBuf)> {
    let mut tsv = format!("{}\n", SUMMARY_TSV_HEADER);
    let mut jsonl = String::new();
    for row in rows {
        tsv.push_str(&row.to_tsv_line());
        tsv.push('\n');
        jsonl.push_str(&serde_json::to_string(row)?);
        jsonl.push('\n');
    }

    let tsv_path = run_dir.join(SUMMARY_TSV_FILE);
    let jsonl_path = run_dir.join(SUMMARY_JSONL_FILE);
    let tsv_tmp = staging_path(&tsv_path);
    let jsonl_tmp = staging_path(&jsonl_path);

    let staged = fs::write(&tsv_tmp, tsv).and_then(|()| fs::write(&jsonl_tmp, jsonl));
    if let Err(err) = staged {
        discard_staged(&[&tsv_tmp, &jsonl_tmp]);
        return Err(err.into());
    }

    fs::rename(&tsv_tmp, &tsv_path)?;
    if let Err(err) = fs::rename(&jsonl_tmp, &jsonl_path) {
        discard_staged(&[&jsonl_tmp]);
        return Err(err.into());
    }
    tracing::info!(rows = rows.len(), tsv = %tsv_path.display(), "wrote summary");

    Ok((tsv_path, jsonl_path))
}

fn staging_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

fn discard_staged(paths: &[&Path]) {
    for path in paths {
        if let Err(err) = fs::remove_file(path)
            && err.kind() != ErrorKind::NotFound
        {
            tracing::warn!(path = %path.display(), error = %err, "cannot remove staged summary file");
        }
    }
}
