//! sb-core: shared foundation for simbatch.
//!
//! Contains:
//! - format (round-trip numeric rendering + timestamps)
//! - numeric (tolerances + invariant parsing helpers)
//! - ids (queue item identity)

pub mod format;
pub mod ids;
pub mod numeric;

pub use format::*;
pub use ids::RequestId;
pub use numeric::*;
