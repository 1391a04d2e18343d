//! Posterior analysis: convergence diagnostics and decision-relevant estimates.

pub mod analyzer;
pub mod diagnostics;

pub use analyzer::*;
pub use diagnostics::*;
