//! Invariant, round-trip-safe rendering of numbers and timestamps.
//!
//! Every file the reporting pipeline writes (text report, TSV, JSONL) renders
//! its numbers through this module, so the same `f64` always produces the
//! same characters regardless of which file it lands in.

use chrono::{DateTime, Local};

/// Shortest decimal string that parses back to exactly `value`.
///
/// Plain notation while the decimal exponent is in `-4..=14`, otherwise
/// `<mantissa>E<sign><at least two digits>` (`1E+300`, `2.5E-07`).
pub fn format_full(value: f64) -> String {
    if !value.is_finite() || value == 0.0 {
        return value.to_string();
    }
    let sci = format!("{:e}", value);
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return value.to_string();
    };
    match exp.parse::<i32>() {
        Ok(exp) if (-4..15).contains(&exp) => value.to_string(),
        Ok(exp) => {
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{}E{}{:02}", mantissa, sign, exp.unsigned_abs())
        }
        Err(_) => value.to_string(),
    }
}

/// Scientific notation for human-facing columns, e.g. `1.234560E+003`.
///
/// `precision` is the number of digits after the decimal point and is
/// clamped to `1..=17`. Not round-trip safe: never compare these strings
/// against `format_full` output.
pub fn format_exp(value: f64, precision: usize) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let precision = precision.clamp(1, 17);
    let raw = format!("{:.*e}", precision, value);
    match raw.split_once('e') {
        Some((mantissa, exp)) => match exp.parse::<i32>() {
            Ok(exp) => {
                let sign = if exp < 0 { '-' } else { '+' };
                format!("{}E{}{:03}", mantissa, sign, exp.unsigned_abs())
            }
            Err(_) => raw,
        },
        None => raw,
    }
}

/// Default human-facing precision used by summary "pretty" columns.
pub const PRETTY_PRECISION: usize = 6;

/// Optional seed rendered for table cells (`None` → empty).
pub fn format_seed(seed: Option<i64>) -> String {
    seed.map(|s| s.to_string()).unwrap_or_default()
}

/// Optional seed rendered for log lines (`None` → `(none)`).
pub fn describe_seed(seed: Option<i64>) -> String {
    seed.map(|s| s.to_string())
        .unwrap_or_else(|| "(none)".to_string())
}

/// `YYYY-MM-DD HH:MM:SS`, used in headers and `generated:` lines.
pub fn format_timestamp(at: &DateTime<Local>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn timestamp_now() -> String {
    format_timestamp(&Local::now())
}

/// `YYYYMMDD_HHMMSS`, used for `run_<stamp>` directory names.
pub fn format_run_stamp(at: &DateTime<Local>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}
