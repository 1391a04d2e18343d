//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and initialises logging
//! - parses CLI arguments
//! - runs the fit pipeline, a trace re-analysis or the price preparation step
//! - prints the human-readable report

use clap::Parser;
use log::info;

use crate::cli::{AnalyzeArgs, Command, FitArgs, PrepareArgs};
use crate::domain::{AnalyzeConfig, ChangePointCount, PrepareConfig, RunConfig, SamplerConfig};
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `cpd` binary.
pub fn run() -> Result<(), AppError> {
    // A missing .env file is fine; the CLI flags and defaults still apply.
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = crate::cli::Cli::parse();
    match cli.command {
        Command::Fit(args) => handle_fit(&args),
        Command::Analyze(args) => handle_analyze(&args),
        Command::Prepare(args) => handle_prepare(&args),
    }
}

fn handle_fit(args: &FitArgs) -> Result<(), AppError> {
    let config = run_config_from_args(args)?;
    let run = pipeline::run_fit(&config)?;

    println!(
        "{}",
        crate::report::format_run_summary(&config, run.series.len(), run.catalog.len(), &run.analysis)
    );
    println!("{}", crate::report::format_matches(&run.matched));
    println!("{}", crate::report::format_artifacts(&run.paths, config.plots));
    Ok(())
}

fn handle_analyze(args: &AnalyzeArgs) -> Result<(), AppError> {
    let config = AnalyzeConfig {
        trace_path: args.trace.clone(),
        returns_path: args.returns.clone(),
        events_path: args.events.clone(),
        output_dir: args.output_dir.clone(),
        plots: !args.no_plots,
    };
    let run = pipeline::run_analyze(&config)?;

    println!(
        "{}",
        crate::report::format_run_summary(&run.config, run.series.len(), run.catalog.len(), &run.analysis)
    );
    println!("{}", crate::report::format_matches(&run.matched));
    println!("{}", crate::report::format_artifacts(&run.paths, config.plots));
    Ok(())
}

fn handle_prepare(args: &PrepareArgs) -> Result<(), AppError> {
    let config = PrepareConfig {
        prices_path: args.prices.clone(),
        output_path: args.output.clone(),
        fill_gaps: args.fill_gaps,
    };
    let prepared = crate::io::prepare_returns(&config)?;
    info!(
        "prepared {} returns from {} price rows ({} dropped, {} filled)",
        prepared.rows.len(),
        prepared.rows_read,
        prepared.dropped_dates,
        prepared.filled
    );
    println!("Processed data saved to: {}", config.output_path.display());
    Ok(())
}

/// Validate CLI flags into the plain configuration the pipeline consumes.
pub fn run_config_from_args(args: &FitArgs) -> Result<RunConfig, AppError> {
    let change_points = ChangePointCount::try_from(args.change_points)?;
    let sampler = SamplerConfig {
        draws: args.draws,
        tune: args.tune,
        chains: args.chains,
        seed: args.seed,
    };
    sampler.validate()?;

    Ok(RunConfig {
        returns_path: args.returns.clone(),
        events_path: args.events.clone(),
        output_dir: args.output_dir.clone(),
        change_points,
        sampler,
        plots: !args.no_plots,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::path::PathBuf;

    fn args() -> FitArgs {
        FitArgs {
            returns: PathBuf::from("r.csv"),
            events: PathBuf::from("e.csv"),
            output_dir: PathBuf::from("out"),
            change_points: 3,
            draws: 100,
            tune: 50,
            chains: 2,
            seed: 7,
            no_plots: true,
        }
    }

    #[test]
    fn args_map_to_run_config() {
        let config = run_config_from_args(&args()).unwrap();
        assert_eq!(config.change_points, ChangePointCount::Three);
        assert_eq!(config.sampler.chains, 2);
        assert_eq!(config.sampler.seed, 7);
        assert!(!config.plots);
    }

    #[test]
    fn unsupported_k_is_config_error() {
        let err = run_config_from_args(&FitArgs { change_points: 2, ..args() }).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn zero_chains_is_config_error() {
        let err = run_config_from_args(&FitArgs { chains: 0, ..args() }).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
