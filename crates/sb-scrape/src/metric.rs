//! Metric extraction from a replicate's `run.log`.
//!
//! Precedence:
//! 1. `METRIC name=value` / `METRIC value` (case-insensitive) wins outright,
//!    first occurrence returns immediately.
//! 2. Otherwise the last parseable `elapsed_s=<value>` line.
//! 3. Otherwise nothing.

use std::fmt;
use std::path::Path;

use sb_core::parse_f64;

use crate::{find_ignore_case, read_lossy};

const METRIC_TOKEN: &str = "metric";
const ELAPSED_KEY: &str = "elapsed_s=";

/// Where a scraped metric came from.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricSource {
    /// Explicit `METRIC` line, optionally with a `name=` prefix.
    Explicit { name: Option<String> },
    /// Fallback `elapsed_s=` line.
    Elapsed,
}

impl fmt::Display for MetricSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricSource::Explicit { name: Some(name) } => write!(f, "METRIC {}", name),
            MetricSource::Explicit { name: None } => write!(f, "METRIC"),
            MetricSource::Elapsed => write!(f, "elapsed_s"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricOutcome {
    Found { value: f64, source: MetricSource },
    NoMetric,
    MissingLog,
    ReadError,
}

impl MetricOutcome {
    pub fn value(&self) -> Option<f64> {
        match self {
            MetricOutcome::Found { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Provenance tag written next to the metric in reports.
    pub fn note(&self) -> String {
        match self {
            MetricOutcome::Found { source, .. } => source.to_string(),
            MetricOutcome::NoMetric => "no metric".to_string(),
            MetricOutcome::MissingLog => "no run.log".to_string(),
            MetricOutcome::ReadError => "read error".to_string(),
        }
    }
}

/// Scrape the metric from a log file on disk.
pub fn extract_metric(log_path: &Path) -> MetricOutcome {
    if !log_path.is_file() {
        return MetricOutcome::MissingLog;
    }
    match read_lossy(log_path) {
        Ok(content) => scan_metric(&content),
        Err(err) => {
            tracing::debug!(path = %log_path.display(), error = %err, "failed to read log");
            MetricOutcome::ReadError
        }
    }
}

/// Scrape the metric from log text already in memory.
pub fn scan_metric(content: &str) -> MetricOutcome {
    let mut elapsed: Option<f64> = None;

    for raw in content.lines() {
        let line = raw.trim();

        if let Some(idx) = find_ignore_case(line, ELAPSED_KEY)
            && let Some(value) = parse_f64(&line[idx + ELAPSED_KEY.len()..])
        {
            elapsed = Some(value);
        }

        if let Some(found) = parse_metric_line(line) {
            return found;
        }
    }

    match elapsed {
        Some(value) => MetricOutcome::Found {
            value,
            source: MetricSource::Elapsed,
        },
        None => MetricOutcome::NoMetric,
    }
}

fn parse_metric_line(line: &str) -> Option<MetricOutcome> {
    let head = line.get(..METRIC_TOKEN.len())?;
    if !head.eq_ignore_ascii_case(METRIC_TOKEN) {
        return None;
    }
    let rest = &line[METRIC_TOKEN.len()..];
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let body = rest.trim();

    if let Some(eq) = body.find('=')
        && eq > 0
    {
        let name = body[..eq].trim();
        if let Some(value) = parse_f64(&body[eq + 1..]) {
            let name = (!name.is_empty()).then(|| name.to_string());
            return Some(MetricOutcome::Found {
                value,
                source: MetricSource::Explicit { name },
            });
        }
    }

    parse_f64(body).map(|value| MetricOutcome::Found {
        value,
        source: MetricSource::Explicit { name: None },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_only_is_the_fallback() {
        let out = scan_metric("[step 0] grid=8\nelapsed_s=12.5\n");
        assert_eq!(out.value(), Some(12.5));
        assert_eq!(out.note(), "elapsed_s");
    }

    #[test]
    fn explicit_metric_wins_regardless_of_order() {
        let later = scan_metric("elapsed_s=12.5\nMETRIC foo=3.14\n");
        assert_eq!(later.value(), Some(3.14));
        assert_eq!(later.note(), "METRIC foo");

        let earlier = scan_metric("METRIC foo=3.14\nelapsed_s=12.5\n");
        assert_eq!(earlier.value(), Some(3.14));
        assert_eq!(earlier.note(), "METRIC foo");
    }

    #[test]
    fn first_explicit_metric_short_circuits() {
        let out = scan_metric("metric a=1\nMETRIC b=2\n");
        assert_eq!(out.value(), Some(1.0));
        assert_eq!(out.note(), "METRIC a");
    }

    #[test]
    fn last_elapsed_wins() {
        let out = scan_metric("elapsed_s=1.0\nnoise\n  done elapsed_s=2.5  \n");
        assert_eq!(out.value(), Some(2.5));
    }

    #[test]
    fn bare_metric_value() {
        let out = scan_metric("Metric   7.25\n");
        assert_eq!(out.value(), Some(7.25));
        assert_eq!(out.note(), "METRIC");
    }

    #[test]
    fn malformed_metric_lines_fall_through() {
        let out = scan_metric("METRICS x=1\nMETRIC x=abc\nMETRIC\nelapsed_s=oops\nelapsed_s=4\n");
        assert_eq!(out.value(), Some(4.0));
        assert_eq!(out.note(), "elapsed_s");
    }

    #[test]
    fn metric_with_tab_separator() {
        let out = scan_metric("METRIC\tenergy = -1.5e-3\n");
        assert_eq!(out.value(), Some(-1.5e-3));
        assert_eq!(out.note(), "METRIC energy");
    }

    #[test]
    fn nothing_found() {
        assert_eq!(scan_metric(""), MetricOutcome::NoMetric);
        assert_eq!(scan_metric("garbage\n\u{0}\u{1}\n"), MetricOutcome::NoMetric);
        assert_eq!(MetricOutcome::NoMetric.note(), "no metric");
    }
}
