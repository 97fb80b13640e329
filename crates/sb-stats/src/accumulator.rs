//! Online mean/variance accumulator.

/// z-score used for the 95% confidence half-width.
///
/// Fixed regardless of sample size; a t-distribution correction would change
/// every previously published half-width.
pub const Z_95: f64 = 1.96;

/// Frozen summary of an [`Accumulator`].
///
/// Spread quantities are zero unless at least two samples were seen.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StatsResult {
    pub n: usize,
    pub sum: f64,
    pub mean: f64,
    pub sample_variance: f64,
    pub sample_stdev: f64,
    pub stderr: f64,
    /// Half-width of the 95% confidence interval (`Z_95 * stderr`).
    pub ci95: f64,
}

impl StatsResult {
    fn new(n: usize, sum: f64, mean: f64, sample_variance: f64) -> Self {
        let sample_variance = if n > 1 { sample_variance } else { 0.0 };
        let sample_stdev = if n > 1 { sample_variance.sqrt() } else { 0.0 };
        let stderr = if n > 1 {
            sample_stdev / (n as f64).sqrt()
        } else {
            0.0
        };
        Self {
            n,
            sum,
            mean,
            sample_variance,
            sample_stdev,
            stderr,
            ci95: Z_95 * stderr,
        }
    }
}

/// Streaming accumulator (Welford). Cheap to copy, mergeable.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Accumulator {
    n: usize,
    mean: f64,
    m2: f64,
    sum: f64,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one sample, silently ignoring NaN and ±infinity.
    pub fn add(&mut self, value: f64) {
        self.add_with(value, true);
    }

    /// Add one sample. With `skip_non_finite == false` non-finite values are
    /// accumulated too (and will poison mean/variance).
    pub fn add_with(&mut self, value: f64, skip_non_finite: bool) {
        if skip_non_finite && !value.is_finite() {
            return;
        }

        self.n += 1;
        self.sum += value;

        let delta = value - self.mean;
        self.mean += delta / self.n as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    /// Fold another accumulator into this one.
    ///
    /// Equivalent (up to rounding) to having added all of `other`'s samples
    /// here; associative and commutative.
    pub fn merge(&mut self, other: &Accumulator) {
        if other.n == 0 {
            return;
        }
        if self.n == 0 {
            *self = *other;
            return;
        }

        let n_a = self.n as f64;
        let n_b = other.n as f64;
        let n = self.n + other.n;
        let n_total = n as f64;

        let delta = other.mean - self.mean;
        self.mean += delta * n_b / n_total;
        self.m2 += other.m2 + delta * delta * n_a * n_b / n_total;
        self.n = n;
        self.sum += other.sum;
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn mean(&self) -> f64 {
        if self.n > 0 { self.mean } else { 0.0 }
    }

    /// Unbiased sample variance (denominator `n - 1`).
    pub fn sample_variance(&self) -> f64 {
        if self.n > 1 {
            self.m2 / (self.n - 1) as f64
        } else {
            0.0
        }
    }

    pub fn sample_stdev(&self) -> f64 {
        self.result().sample_stdev
    }

    /// Standard error of the mean.
    pub fn stderr(&self) -> f64 {
        self.result().stderr
    }

    pub fn ci95(&self) -> f64 {
        self.result().ci95
    }

    pub fn result(&self) -> StatsResult {
        StatsResult::new(self.n, self.sum, self.mean(), self.sample_variance())
    }
}

impl Extend<f64> for Accumulator {
    fn extend<I: IntoIterator<Item = f64>>(&mut self, iter: I) {
        for value in iter {
            self.add(value);
        }
    }
}

impl FromIterator<f64> for Accumulator {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut acc = Accumulator::new();
        acc.extend(iter);
        acc
    }
}

/// One-shot summary of a slice (non-finite values skipped).
pub fn compute(values: &[f64]) -> StatsResult {
    values.iter().copied().collect::<Accumulator>().result()
}
