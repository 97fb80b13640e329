//! sb-stats: numerically stable summary statistics for replicate metrics.
//!
//! Mean and variance are tracked with Welford's recurrence so long streams of
//! similar values do not lose precision to catastrophic cancellation, and two
//! accumulators can be merged with the parallel form of the same update.

pub mod accumulator;

pub use accumulator::{Accumulator, StatsResult, Z_95, compute};
