//! Shared domain types.
//!
//! These types are intentionally kept lightweight so they can be:
//!
//! - used in-memory by the sampler and the analysis stages
//! - exported to CSV/JSON artifacts
//! - reloaded later (returns + events) without any conversion layer

use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// One observation of the return series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReturnObs {
    pub date: NaiveDate,
    pub log_return: f64,
}

/// A strictly chronological log-return series.
///
/// Index `i` of the series is the time index `t` used by the segmentation model,
/// so the loader refuses anything that is not strictly increasing in date.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReturnSeries {
    pub obs: Vec<ReturnObs>,
}

impl ReturnSeries {
    pub fn new(obs: Vec<ReturnObs>) -> Self {
        Self { obs }
    }

    pub fn len(&self) -> usize {
        self.obs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.obs.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.obs.iter().map(|o| o.log_return).collect()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.obs.iter().map(|o| o.date).collect()
    }

    pub fn date_at(&self, index: usize) -> Option<NaiveDate> {
        self.obs.get(index).map(|o| o.date)
    }

    /// First and last date, if the series is non-empty.
    pub fn span(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((self.obs.first()?.date, self.obs.last()?.date))
    }
}

/// A labeled external event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub date: NaiveDate,
    pub description: String,
    pub event_type: String,
}

/// Events sorted ascending by date, one event per date.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EventCatalog {
    pub events: Vec<EventRecord>,
}

impl EventCatalog {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Number of unknown breakpoints in the segmentation model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangePointCount {
    One,
    Three,
}

impl ChangePointCount {
    /// Number of breakpoints `k`.
    pub fn k(self) -> usize {
        match self {
            ChangePointCount::One => 1,
            ChangePointCount::Three => 3,
        }
    }

    /// Number of regimes `k + 1`.
    pub fn regimes(self) -> usize {
        self.k() + 1
    }
}

impl TryFrom<usize> for ChangePointCount {
    type Error = AppError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ChangePointCount::One),
            3 => Ok(ChangePointCount::Three),
            other => Err(AppError::config(format!(
                "Unsupported number of change points: {other} (expected 1 or 3)."
            ))),
        }
    }
}

/// MCMC settings for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Retained draws per chain.
    pub draws: usize,
    /// Warm-up iterations per chain (discarded).
    pub tune: usize,
    pub chains: usize,
    pub seed: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            draws: 10_000,
            tune: 5_000,
            chains: 4,
            seed: 42,
        }
    }
}

impl SamplerConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.draws == 0 {
            return Err(AppError::config("Draws per chain must be > 0."));
        }
        if self.chains == 0 {
            return Err(AppError::config("Chain count must be > 0."));
        }
        Ok(())
    }
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub returns_path: PathBuf,
    pub events_path: PathBuf,
    pub output_dir: PathBuf,
    pub change_points: ChangePointCount,
    pub sampler: SamplerConfig,
    /// Render the PNG artifacts.
    pub plots: bool,
}

/// Re-analysis of a saved trace (`cpd analyze`): no sampling, same artifacts.
#[derive(Debug, Clone)]
pub struct AnalyzeConfig {
    pub trace_path: PathBuf,
    pub returns_path: PathBuf,
    pub events_path: PathBuf,
    pub output_dir: PathBuf,
    pub plots: bool,
}

/// Configuration of the price-to-returns preparation step.
#[derive(Debug, Clone)]
pub struct PrepareConfig {
    pub prices_path: PathBuf,
    pub output_path: PathBuf,
    /// Insert missing weekdays with linearly interpolated prices.
    pub fill_gaps: bool,
}

/// Posterior point estimate of one breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangePointEstimate {
    pub date: NaiveDate,
    /// Posterior mode of the breakpoint index.
    pub index: usize,
}

/// Shift of the mean log-return across one breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeShift {
    pub mean_before: f64,
    pub mean_after: f64,
    /// `None` when the baseline mean is too close to zero.
    pub impact_percent: Option<f64>,
}

/// A change point paired with its temporally nearest catalog event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedEvent {
    pub change_point: ChangePointEstimate,
    pub event: EventRecord,
    pub date_diff_days: i64,
    pub shift: RegimeShift,
}

/// Summary statistics of one model parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSummary {
    pub name: String,
    pub mean: f64,
    pub sd: f64,
    pub hdi_low: f64,
    pub hdi_high: f64,
    pub ess: f64,
    pub r_hat: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConvergenceStatus {
    Converged,
    /// `max(r_hat)` above the threshold. Results are usable but flagged.
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceSummary {
    pub parameters: Vec<ParameterSummary>,
    pub max_r_hat: f64,
    pub status: ConvergenceStatus,
}

impl ConvergenceSummary {
    pub fn parameter(&self, name: &str) -> Option<&ParameterSummary> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn converged(&self) -> bool {
        self.status == ConvergenceStatus::Converged
    }
}
