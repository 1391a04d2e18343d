//! Point estimates derived from a fitted posterior.
//!
//! - breakpoint estimate = posterior **mode** of its index (ties -> smallest)
//! - regime mean = posterior mean of `mu_i`
//! - regime shift across breakpoint `j` = change from regime `j` to `j + 1`

use log::{info, warn};

use crate::analysis::diagnostics::{R_HAT_THRESHOLD, summarize};
use crate::domain::{ChangePointEstimate, ConvergenceSummary, RegimeShift, ReturnSeries};
use crate::error::AppError;
use crate::fit::{FitOutput, PosteriorSample};
use crate::math::{mean, mode};
use crate::models::SegmentationModel;

/// Baselines with a smaller magnitude make the relative change undefined.
pub const IMPACT_EPSILON: f64 = 1e-10;

/// Everything the analyzer derives from one fit.
#[derive(Debug, Clone)]
pub struct PosteriorAnalysis {
    pub convergence: ConvergenceSummary,
    pub change_points: Vec<ChangePointEstimate>,
    /// Posterior mean of `mu_1 ..= mu_{k+1}`.
    pub regime_means: Vec<f64>,
    /// One shift per change point, in breakpoint order.
    pub shifts: Vec<RegimeShift>,
}

/// Run the full analysis. Non-convergence is logged and recorded, never an error.
pub fn analyze(fit: &FitOutput, series: &ReturnSeries) -> Result<PosteriorAnalysis, AppError> {
    let convergence = summarize(&fit.posterior);
    if convergence.converged() {
        info!("Model converged (r_hat = {:.2}).", convergence.max_r_hat);
    } else {
        warn!(
            "Model may not have converged (r_hat = {:.2} > {R_HAT_THRESHOLD}). Check trace plots.",
            convergence.max_r_hat
        );
    }

    let change_points = change_point_estimates(&fit.model, &fit.posterior, series)?;
    let regime_means = regime_means(&fit.model, &fit.posterior);
    let shifts = regime_shifts(&regime_means);

    Ok(PosteriorAnalysis {
        convergence,
        change_points,
        regime_means,
        shifts,
    })
}

/// Posterior mode of every breakpoint, mapped to its date.
pub fn change_point_estimates(
    model: &SegmentationModel,
    posterior: &PosteriorSample,
    series: &ReturnSeries,
) -> Result<Vec<ChangePointEstimate>, AppError> {
    if series.len() != model.n() {
        return Err(AppError::model(format!(
            "Series length {} does not match the fitted model (n={}).",
            series.len(),
            model.n()
        )));
    }

    model
        .tau_names()
        .iter()
        .map(|name| {
            let column = posterior
                .column_index(name)
                .ok_or_else(|| AppError::model(format!("Posterior has no `{name}` draws.")))?;
            let index = mode(&posterior.pooled_indices(column))
                .ok_or_else(|| AppError::model(format!("Posterior has no draws for `{name}`.")))?;
            let date = series
                .date_at(index)
                .ok_or_else(|| AppError::model(format!("Mode of `{name}` ({index}) is outside the series.")))?;
            Ok(ChangePointEstimate { date, index })
        })
        .collect()
}

pub fn regime_means(model: &SegmentationModel, posterior: &PosteriorSample) -> Vec<f64> {
    (0..model.regimes())
        .map(|r| mean(&posterior.pooled(model.mu_column(r))))
        .collect()
}

pub fn regime_shifts(regime_means: &[f64]) -> Vec<RegimeShift> {
    regime_means
        .windows(2)
        .map(|w| RegimeShift {
            mean_before: w[0],
            mean_after: w[1],
            impact_percent: impact_percent(w[0], w[1]),
        })
        .collect()
}

/// Relative change of the mean in percent of the baseline magnitude.
pub fn impact_percent(mean_before: f64, mean_after: f64) -> Option<f64> {
    if mean_before.abs() < IMPACT_EPSILON {
        return None;
    }
    Some((mean_after - mean_before) / mean_before.abs() * 100.0)
}
