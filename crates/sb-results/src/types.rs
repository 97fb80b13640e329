//! Report row types.

use serde::{Deserialize, Serialize};

use sb_core::{PRETTY_PRECISION, format_exp, format_full};
use sb_stats::StatsResult;

/// One replicate's scraped result.
#[derive(Debug, Clone, PartialEq)]
pub struct RowEntry {
    /// Replicate directory name, e.g. `rep_003`.
    pub rep_id: String,
    pub seed: Option<i64>,
    pub metric: f64,
    /// Provenance of the metric (`METRIC foo`, `METRIC`, `elapsed_s`).
    pub note: String,
}

/// One grid group's summary, as written to both TSV and JSONL.
///
/// Mean and stderr are carried as already-formatted strings so every output
/// shows the same characters for the same value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub grid: i64,
    pub stat: String,
    pub mean_full: String,
    pub stderr_full: String,
    pub n: usize,
    #[serde(rename = "mean_pm_pretty")]
    pub pretty: String,
}

impl SummaryRow {
    pub fn from_stats(grid: i64, stats: &StatsResult) -> Self {
        Self {
            grid,
            stat: "value".to_string(),
            mean_full: format_full(stats.mean),
            stderr_full: format_full(stats.stderr),
            n: stats.n,
            pretty: format!(
                "{} ± {}",
                format_exp(stats.mean, PRETTY_PRECISION),
                format_exp(stats.stderr, PRETTY_PRECISION)
            ),
        }
    }

    pub fn to_tsv_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            self.grid, self.stat, self.mean_full, self.stderr_full, self.n, self.pretty
        )
    }
}
