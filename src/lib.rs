//! `regime-breaks` library crate.
//!
//! The binary (`cpd`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the sampler and analysis stages are reusable outside the CLI

pub mod analysis;
pub mod app;
pub mod cli;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod matching;
pub mod math;
pub mod models;
pub mod plot;
pub mod report;
