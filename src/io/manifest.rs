//! Read/write the run manifest JSON.
//!
//! The manifest is the machine-readable record of a run:
//! - tool + version, model size (k) and sampler settings
//! - the series length and date span
//! - convergence outcome and per-chain sampler diagnostics
//! - the artifact files written

use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{ConvergenceStatus, SamplerConfig};
use crate::error::AppError;
use crate::fit::ChainStats;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesInfo {
    pub observations: usize,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub tool: String,
    pub version: String,
    pub change_points: usize,
    pub sampler: SamplerConfig,
    pub series: SeriesInfo,
    pub events: usize,
    /// `None` when `max(r_hat)` is not finite.
    pub max_r_hat: Option<f64>,
    pub status: ConvergenceStatus,
    pub chains: Vec<ChainStats>,
    pub artifacts: Vec<PathBuf>,
}

pub fn write_manifest(path: &Path, manifest: &RunManifest) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create manifest '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, manifest)
        .map_err(|e| AppError::io(format!("Failed to write manifest JSON: {e}")))?;
    Ok(())
}

pub fn read_manifest(path: &Path) -> Result<RunManifest, AppError> {
    let file = crate::error::open_input(path, "manifest JSON")?;
    let manifest: RunManifest =
        serde_json::from_reader(file).map_err(|e| AppError::data_format(format!("Invalid manifest JSON: {e}")))?;
    Ok(manifest)
}
