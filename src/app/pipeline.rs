//! Shared "fit pipeline" logic.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! load returns + events -> sample posterior -> analyze -> match events -> write artifacts
//!
//! `run_analyze` replaces the sampling stage with a saved trace. The CLI
//! front-end can then focus on presentation.

use log::info;

use crate::analysis::{PosteriorAnalysis, analyze};
use crate::domain::{AnalyzeConfig, ChangePointCount, EventCatalog, MatchedEvent, ReturnSeries, RunConfig};
use crate::error::AppError;
use crate::fit::{FitOutput, fit_change_points};
use crate::io::{
    ArtifactPaths, RunManifest, SeriesInfo, TraceMetadata, load_events, load_returns, read_trace_with_metadata,
    write_change_points_csv, write_manifest, write_matched_events_csv, write_posterior_summaries, write_trace,
};
use crate::models::SegmentationModel;
use crate::matching::match_events;
use crate::plot::{render_overlay_plot, render_trace_plot};

/// All computed outputs of a single `cpd fit` / `cpd analyze` run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Effective run settings (rebuilt from the trace for `analyze`).
    pub config: RunConfig,
    pub series: ReturnSeries,
    pub catalog: EventCatalog,
    pub fit: FitOutput,
    pub analysis: PosteriorAnalysis,
    pub matched: Vec<MatchedEvent>,
    pub paths: ArtifactPaths,
}

/// Execute the full pipeline and persist every artifact.
pub fn run_fit(config: &RunConfig) -> Result<RunOutput, AppError> {
    // 1) Inputs. Any failure here aborts before sampling.
    let series = load_returns(&config.returns_path)?;
    let catalog = load_events(&config.events_path)?;

    // 2) Posterior.
    info!(
        "sampling k={} model: {} chains x ({} tune + {} draws)",
        config.change_points.k(),
        config.sampler.chains,
        config.sampler.tune,
        config.sampler.draws
    );
    let fit = fit_change_points(&series.values(), config.change_points, &config.sampler)?;

    finish_run(config.clone(), series, catalog, fit)
}

/// Rebuild estimates, matches and artifacts from a trace written by `run_fit`.
pub fn run_analyze(config: &AnalyzeConfig) -> Result<RunOutput, AppError> {
    // 1) Inputs.
    let (posterior, meta) = read_trace_with_metadata(&config.trace_path)?;
    let series = load_returns(&config.returns_path)?;
    let catalog = load_events(&config.events_path)?;

    // 2) Model the trace was drawn from.
    let change_points = ChangePointCount::try_from(meta.change_points).map_err(|_| {
        AppError::data_format(format!(
            "Trace '{}' records {} change points (expected 1 or 3).",
            config.trace_path.display(),
            meta.change_points
        ))
    })?;
    let model = SegmentationModel::new(&series.values(), change_points)?;
    if model.parameter_names() != posterior.parameter_names {
        return Err(AppError::data_format(format!(
            "Trace parameters [{}] do not match a k={} model.",
            posterior.parameter_names.join(", "),
            change_points.k()
        )));
    }
    info!(
        "re-analysing {} chains x {} draws from {}",
        posterior.num_chains(),
        posterior.draws_per_chain(),
        config.trace_path.display()
    );

    let run_config = RunConfig {
        returns_path: config.returns_path.clone(),
        events_path: config.events_path.clone(),
        output_dir: config.output_dir.clone(),
        change_points,
        sampler: meta.sampler,
        plots: config.plots,
    };
    finish_run(run_config, series, catalog, FitOutput { model, posterior })
}

fn finish_run(
    config: RunConfig,
    series: ReturnSeries,
    catalog: EventCatalog,
    fit: FitOutput,
) -> Result<RunOutput, AppError> {
    // 3) Estimates + event matching.
    let analysis = analyze(&fit, &series)?;
    let matched = match_events(&analysis.change_points, &analysis.shifts, &catalog)?;

    // 4) Artifacts.
    let paths = ArtifactPaths::new(&config.output_dir);
    write_artifacts(&config, &series, &catalog, &fit, &analysis, &matched, &paths)?;

    Ok(RunOutput {
        config,
        series,
        catalog,
        fit,
        analysis,
        matched,
        paths,
    })
}

fn write_artifacts(
    config: &RunConfig,
    series: &ReturnSeries,
    catalog: &EventCatalog,
    fit: &FitOutput,
    analysis: &PosteriorAnalysis,
    matched: &[MatchedEvent],
    paths: &ArtifactPaths,
) -> Result<(), AppError> {
    paths.ensure_dirs()?;

    write_posterior_summaries(&paths.summaries, &analysis.convergence)?;
    write_trace(
        &paths.trace,
        &fit.posterior,
        &TraceMetadata {
            change_points: config.change_points.k(),
            sampler: config.sampler,
            created_at: chrono::Utc::now().to_rfc3339(),
        },
    )?;
    if config.plots {
        render_trace_plot(&paths.trace_plot, &fit.posterior)?;
        render_overlay_plot(&paths.overlay_plot, series, &analysis.change_points)?;
    }
    write_change_points_csv(&paths.change_points, &analysis.change_points)?;
    write_matched_events_csv(&paths.matched_events, matched)?;

    let mut artifacts = vec![
        paths.summaries.clone(),
        paths.trace.clone(),
        paths.change_points.clone(),
        paths.matched_events.clone(),
    ];
    if config.plots {
        artifacts.push(paths.trace_plot.clone());
        artifacts.push(paths.overlay_plot.clone());
    }

    let span = series.span();
    let manifest = RunManifest {
        tool: "cpd".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        change_points: config.change_points.k(),
        sampler: config.sampler,
        series: SeriesInfo {
            observations: series.len(),
            start: span.map(|(s, _)| s),
            end: span.map(|(_, e)| e),
        },
        events: catalog.len(),
        max_r_hat: Some(analysis.convergence.max_r_hat).filter(|r| r.is_finite()),
        status: analysis.convergence.status,
        chains: fit.posterior.stats.clone(),
        artifacts,
    };
    write_manifest(&paths.manifest, &manifest)?;
    info!("artifacts written to {}", paths.output_dir.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConvergenceStatus, SamplerConfig};
    use crate::error::ErrorKind;
    use crate::fit::PosteriorSample;
    use crate::io::{read_manifest, read_trace};
    use nalgebra::DMatrix;
    use std::fmt::Write as _;
    use std::path::PathBuf;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("regime_breaks_pipeline_{name}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Deterministic returns whose volatility jumps at index 60.
    fn write_inputs(dir: &std::path::Path) -> (PathBuf, PathBuf) {
        let start = chrono::NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let mut returns = String::from("Date,LogReturn\n");
        for i in 0..120i64 {
            let scale = if i < 60 { 0.004 } else { 0.04 };
            let v = ((i * 37 % 11) as f64 - 5.0) / 5.0 * scale;
            let _ = writeln!(returns, "{},{v}", start + chrono::Duration::days(i));
        }
        let returns_path = dir.join("returns.csv");
        std::fs::write(&returns_path, returns).unwrap();

        let events_path = dir.join("events.csv");
        std::fs::write(
            &events_path,
            "Date,Event_Description,Event_Type\n2020-01-15,Early,Policy\n2020-03-02,Shock,Market\n2020-04-20,Late,Policy\n",
        )
        .unwrap();
        (returns_path, events_path)
    }

    fn config(dir: &std::path::Path, returns: PathBuf, events: PathBuf, k: ChangePointCount, plots: bool) -> RunConfig {
        RunConfig {
            returns_path: returns,
            events_path: events,
            output_dir: dir.join("results"),
            change_points: k,
            sampler: SamplerConfig {
                draws: 300,
                tune: 200,
                chains: 2,
                seed: 42,
            },
            plots,
        }
    }

    #[test]
    fn full_run_writes_every_artifact() {
        let dir = test_dir("full");
        let (returns, events) = write_inputs(&dir);
        let cfg = config(&dir, returns, events, ChangePointCount::Three, true);

        let run = run_fit(&cfg).unwrap();
        assert_eq!(run.analysis.change_points.len(), 3);
        assert_eq!(run.matched.len(), 3);

        for path in [
            &run.paths.summaries,
            &run.paths.trace,
            &run.paths.change_points,
            &run.paths.matched_events,
            &run.paths.trace_plot,
            &run.paths.overlay_plot,
            &run.paths.manifest,
        ] {
            assert!(path.is_file(), "missing {}", path.display());
        }

        let cps = std::fs::read_to_string(&run.paths.change_points).unwrap();
        assert_eq!(cps.lines().count(), 4);
        assert!(cps.starts_with("Date,Tau_Mode\n"));

        let trace = read_trace(&run.paths.trace).unwrap();
        assert_eq!(trace.chains, run.fit.posterior.chains);

        let manifest = read_manifest(&run.paths.manifest).unwrap();
        assert_eq!(manifest.change_points, 3);
        assert_eq!(manifest.series.observations, 120);
        assert_eq!(manifest.artifacts.len(), 6);
    }

    #[test]
    fn single_break_run_without_plots() {
        let dir = test_dir("single");
        let (returns, events) = write_inputs(&dir);
        let cfg = config(&dir, returns, events, ChangePointCount::One, false);

        let run = run_fit(&cfg).unwrap();
        assert_eq!(run.analysis.change_points.len(), 1);
        assert!(!run.paths.overlay_plot.exists());
        assert!(run.paths.matched_events.is_file());
    }

    #[test]
    fn missing_returns_aborts_before_sampling() {
        let dir = test_dir("missing");
        let (_, events) = write_inputs(&dir);
        let cfg = config(&dir, dir.join("absent.csv"), events, ChangePointCount::One, false);

        let err = run_fit(&cfg).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(!cfg.output_dir.exists());
    }

    #[test]
    fn header_only_events_abort_before_sampling() {
        let dir = test_dir("no_events");
        let (returns, events) = write_inputs(&dir);
        std::fs::write(&events, "Date,Event_Description,Event_Type\n").unwrap();
        let cfg = config(&dir, returns, events, ChangePointCount::One, false);

        let err = run_fit(&cfg).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataFormat);
        assert!(!cfg.output_dir.exists());
    }

    #[test]
    fn unconverged_run_still_writes_every_artifact() {
        let dir = test_dir("warning");
        let (returns, events) = write_inputs(&dir);
        let cfg = config(&dir, returns, events, ChangePointCount::One, true);
        let series = load_returns(&cfg.returns_path).unwrap();
        let catalog = load_events(&cfg.events_path).unwrap();

        // Each chain is stuck on a different breakpoint, so r_hat is infinite.
        let model = SegmentationModel::new(&series.values(), ChangePointCount::One).unwrap();
        let chain = |tau: f64| {
            DMatrix::from_fn(50, 5, |i, j| match j {
                0 => tau,
                1 => 0.001,
                2 => -0.002,
                _ => 0.01 + i as f64 * 1e-5,
            })
        };
        let posterior = PosteriorSample::new(model.parameter_names(), vec![chain(40.0), chain(80.0)], Vec::new()).unwrap();

        let run = finish_run(cfg.clone(), series, catalog, FitOutput { model, posterior }).unwrap();
        assert_eq!(run.analysis.convergence.status, ConvergenceStatus::Warning);
        assert_eq!(run.matched.len(), 1);

        for path in [
            &run.paths.summaries,
            &run.paths.trace,
            &run.paths.change_points,
            &run.paths.matched_events,
            &run.paths.trace_plot,
            &run.paths.overlay_plot,
            &run.paths.manifest,
        ] {
            assert!(path.is_file(), "missing {}", path.display());
        }

        let manifest = read_manifest(&run.paths.manifest).unwrap();
        assert_eq!(manifest.status, ConvergenceStatus::Warning);
        assert_eq!(manifest.max_r_hat, None);
    }

    #[test]
    fn analyze_reproduces_a_fit_from_its_trace() {
        let dir = test_dir("analyze");
        let (returns, events) = write_inputs(&dir);
        let cfg = config(&dir, returns.clone(), events.clone(), ChangePointCount::Three, false);
        let fitted = run_fit(&cfg).unwrap();

        let again = run_analyze(&AnalyzeConfig {
            trace_path: fitted.paths.trace.clone(),
            returns_path: returns,
            events_path: events,
            output_dir: dir.join("reanalysis"),
            plots: false,
        })
        .unwrap();

        assert_eq!(again.config.change_points, ChangePointCount::Three);
        assert_eq!(again.config.sampler, cfg.sampler);
        assert_eq!(again.analysis.change_points, fitted.analysis.change_points);
        assert_eq!(again.matched, fitted.matched);
        assert!(again.paths.manifest.is_file());
        assert!(again.paths.matched_events.is_file());
    }

    #[test]
    fn analyze_rejects_a_trace_for_other_data() {
        let dir = test_dir("analyze_mismatch");
        let (returns, events) = write_inputs(&dir);
        let cfg = config(&dir, returns, events.clone(), ChangePointCount::One, false);
        let fitted = run_fit(&cfg).unwrap();

        let short = dir.join("short.csv");
        std::fs::write(&short, "Date,LogReturn\n2020-01-01,0.01\n").unwrap();
        let err = run_analyze(&AnalyzeConfig {
            trace_path: fitted.paths.trace.clone(),
            returns_path: short,
            events_path: events.clone(),
            output_dir: dir.join("reanalysis"),
            plots: false,
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Model);

        let err = run_analyze(&AnalyzeConfig {
            trace_path: dir.join("absent.nc"),
            returns_path: cfg.returns_path.clone(),
            events_path: events,
            output_dir: dir.join("reanalysis"),
            plots: false,
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
