//! Reporting utilities: run summary, matched events, posterior summary table.

pub mod format;

pub use format::*;
