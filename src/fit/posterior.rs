//! Posterior sample collection.
//!
//! Draws are stored per chain as a `draws × parameters` matrix; the column
//! order is [`SegmentationModel::parameter_names`]. Breakpoints are stored as
//! exact integers in `f64` columns.
//!
//! [`SegmentationModel::parameter_names`]: crate::models::SegmentationModel::parameter_names

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Per-chain sampler diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainStats {
    pub chain: usize,
    /// Acceptance rate of breakpoint proposals (retained iterations only).
    pub tau_acceptance: Vec<f64>,
    /// Random-walk half-width of each breakpoint after tuning.
    pub tau_step: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct PosteriorSample {
    pub parameter_names: Vec<String>,
    pub chains: Vec<DMatrix<f64>>,
    pub stats: Vec<ChainStats>,
}

impl PosteriorSample {
    pub fn new(
        parameter_names: Vec<String>,
        chains: Vec<DMatrix<f64>>,
        stats: Vec<ChainStats>,
    ) -> Result<Self, AppError> {
        let Some(first) = chains.first() else {
            return Err(AppError::model("Posterior must contain at least one chain."));
        };
        let draws = first.nrows();
        for (c, m) in chains.iter().enumerate() {
            if m.nrows() != draws || m.ncols() != parameter_names.len() {
                return Err(AppError::model(format!(
                    "Chain {c} has shape {}x{}, expected {draws}x{}.",
                    m.nrows(),
                    m.ncols(),
                    parameter_names.len()
                )));
            }
        }
        Ok(Self {
            parameter_names,
            chains,
            stats,
        })
    }

    pub fn num_chains(&self) -> usize {
        self.chains.len()
    }

    pub fn draws_per_chain(&self) -> usize {
        self.chains.first().map(|m| m.nrows()).unwrap_or(0)
    }

    /// `chains × draws_per_chain`.
    pub fn total_draws(&self) -> usize {
        self.num_chains() * self.draws_per_chain()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.parameter_names.iter().position(|n| n == name)
    }

    pub fn chain_values(&self, chain: usize, column: usize) -> Vec<f64> {
        self.chains[chain].column(column).iter().copied().collect()
    }

    /// All draws of one parameter, chain-major.
    pub fn pooled(&self, column: usize) -> Vec<f64> {
        self.chains
            .iter()
            .flat_map(|m| m.column(column).iter().copied().collect::<Vec<_>>())
            .collect()
    }

    /// All draws of a breakpoint column as indices.
    pub fn pooled_indices(&self, column: usize) -> Vec<usize> {
        self.pooled(column)
            .into_iter()
            .map(|v| v.round().max(0.0) as usize)
            .collect()
    }

    pub fn pooled_by_name(&self, name: &str) -> Option<Vec<f64>> {
        self.column_index(name).map(|c| self.pooled(c))
    }
}
