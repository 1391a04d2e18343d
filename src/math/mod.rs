//! Mathematical utilities: descriptive statistics and slice sampling.

pub mod slice;
pub mod stats;

pub use slice::*;
pub use stats::*;
