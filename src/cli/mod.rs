//! Command-line parsing for the change-point detector.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! sampling/analysis code. Paths may also come from the environment (or a
//! `.env` file) so repeated runs need no flags.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "cpd", version, about = "Bayesian change-point detection on log-returns")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit the change-point model, match breaks to events, and write artifacts.
    Fit(FitArgs),
    /// Re-run estimates, matching and artifacts from a saved trace without sampling.
    Analyze(AnalyzeArgs),
    /// Turn a raw price file into the log-return file `fit` consumes.
    Prepare(PrepareArgs),
}

#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Log-return CSV (`Date`, `LogReturn`).
    #[arg(long, env = "CPD_RETURNS", value_name = "CSV")]
    pub returns: PathBuf,

    /// Event catalog CSV (`Date`, `Event_Description`, `Event_Type`).
    #[arg(long, env = "CPD_EVENTS", value_name = "CSV")]
    pub events: PathBuf,

    /// Output directory for all artifacts.
    #[arg(long = "out", env = "CPD_OUTPUT_DIR", value_name = "DIR", default_value = "results")]
    pub output_dir: PathBuf,

    /// Number of change points (1 or 3).
    #[arg(short = 'k', long = "change-points", default_value_t = 3)]
    pub change_points: usize,

    /// Retained draws per chain.
    #[arg(long, default_value_t = 10_000)]
    pub draws: usize,

    /// Warm-up iterations per chain.
    #[arg(long, default_value_t = 5_000)]
    pub tune: usize,

    /// Independent chains.
    #[arg(long, default_value_t = 4)]
    pub chains: usize,

    /// Random seed (results are reproducible for a fixed seed).
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Skip the PNG figures.
    #[arg(long)]
    pub no_plots: bool,
}

#[derive(Debug, Parser, Clone)]
pub struct AnalyzeArgs {
    /// Posterior trace written by `fit` (`change_point_trace.nc`).
    #[arg(long, value_name = "NC")]
    pub trace: PathBuf,

    /// Log-return CSV the trace was fitted on.
    #[arg(long, env = "CPD_RETURNS", value_name = "CSV")]
    pub returns: PathBuf,

    /// Event catalog CSV.
    #[arg(long, env = "CPD_EVENTS", value_name = "CSV")]
    pub events: PathBuf,

    /// Output directory for all artifacts.
    #[arg(long = "out", env = "CPD_OUTPUT_DIR", value_name = "DIR", default_value = "results")]
    pub output_dir: PathBuf,

    /// Skip the PNG figures.
    #[arg(long)]
    pub no_plots: bool,
}

#[derive(Debug, Parser, Clone)]
pub struct PrepareArgs {
    /// Raw price CSV (`Date`, `Price`).
    #[arg(long, value_name = "CSV")]
    pub prices: PathBuf,

    /// Output CSV (`Date`, `Price`, `LogReturn`).
    #[arg(long = "out", value_name = "CSV")]
    pub output: PathBuf,

    /// Insert missing weekdays with linearly interpolated prices.
    #[arg(long)]
    pub fill_gaps: bool,
}
