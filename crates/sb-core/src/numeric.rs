/// Absolute/relative tolerance pair for float comparisons.
#[derive(Clone, Copy, Debug)]
pub struct Tolerances {
    pub abs: f64,
    pub rel: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            abs: 1e-12,
            rel: 1e-9,
        }
    }
}

pub fn nearly_equal(a: f64, b: f64, tol: Tolerances) -> bool {
    let diff = (a - b).abs();
    if diff <= tol.abs {
        return true;
    }
    diff <= tol.rel * a.abs().max(b.abs())
}

/// Parse a float the way log files write them: surrounding whitespace is
/// ignored, `.` is the only decimal separator, exponents are allowed.
pub fn parse_f64(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

/// Parse a signed integer (optional leading sign, surrounding whitespace ignored).
pub fn parse_i64(text: &str) -> Option<i64> {
    text.trim().parse::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearly_equal_basic() {
        let tol = Tolerances {
            abs: 1e-12,
            rel: 1e-9,
        };
        assert!(nearly_equal(1.0, 1.0 + 1e-12, tol));
        assert!(nearly_equal(0.0, 1e-13, tol));
        assert!(!nearly_equal(1.0, 1.0 + 1e-6, tol));
    }

    #[test]
    fn parse_f64_accepts_exponents_and_padding() {
        assert_eq!(parse_f64(" 12.5 "), Some(12.5));
        assert_eq!(parse_f64("3e-2"), Some(0.03));
        assert_eq!(parse_f64("-7"), Some(-7.0));
        assert_eq!(parse_f64(""), None);
        assert_eq!(parse_f64("12.5s"), None);
        assert_eq!(parse_f64("1,5"), None);
    }

    #[test]
    fn parse_i64_handles_signs() {
        assert_eq!(parse_i64("42"), Some(42));
        assert_eq!(parse_i64("+42"), Some(42));
        assert_eq!(parse_i64("-3"), Some(-3));
        assert_eq!(parse_i64("+-3"), None);
        assert_eq!(parse_i64("4.0"), None);
        assert_eq!(parse_i64("abc"), None);
    }
}
