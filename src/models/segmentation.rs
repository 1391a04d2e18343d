//! Bayesian segmentation model with `k ∈ {1, 3}` breakpoints.
//!
//! For `k` breakpoints `τ_1 ≤ … ≤ τ_k` the index range `[0, n)` is split into
//! `k + 1` contiguous regimes:
//!
//! ```text
//! regime(t) = min{ i : τ_i ≥ t }      (k when no breakpoint is ≥ t)
//! y_t ~ Normal(mu[regime(t)], sigma[regime(t)])
//! ```
//!
//! so regime 0 is `[0, τ_1]`, regime `i` is `(τ_i, τ_{i+1}]` and the last regime
//! is `(τ_k, n)`. A regime may be empty when two breakpoints coincide.
//!
//! Priors (`s = std(y)`, population):
//!
//! ```text
//! k = 1:  τ   ~ DiscreteUniform(0, n-1)
//! k = 3:  τ_1 ~ DU(0, ⌊n/3⌋),  τ_2 ~ DU(⌊n/3⌋, ⌊2n/3⌋),  τ_3 ~ DU(⌊2n/3⌋, n-1)
//! mu_i    ~ Normal(0, s/10)
//! sigma_i ~ HalfNormal(s/2)
//! ```
//!
//! The disjoint ranges for `k = 3` keep the breakpoints ordered without an
//! explicit constraint and rule out label switching.
//!
//! Segment likelihoods are evaluated in O(1) from prefix sums of `y` and `y²`,
//! which is what makes per-breakpoint Metropolis updates cheap.

use std::f64::consts::PI;

use crate::domain::ChangePointCount;
use crate::error::AppError;
use crate::math::std_pop;

/// A series whose std is below this fraction of `max |y|` is treated as constant.
const RELATIVE_STD_FLOOR: f64 = 1e-12;

/// The specified (not yet fitted) model for one series.
#[derive(Debug, Clone)]
pub struct SegmentationModel {
    count: ChangePointCount,
    n: usize,
    data_std: f64,
    mu_prior_sd: f64,
    sigma_prior_sd: f64,
    /// Inclusive prior support `[lower, upper]` of each breakpoint.
    tau_bounds: Vec<(usize, usize)>,
    prefix_sum: Vec<f64>,
    prefix_sq: Vec<f64>,
}

/// Sufficient statistics of one contiguous segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentStats {
    pub count: usize,
    pub sum: f64,
    pub sum_sq: f64,
}

/// A full assignment of every latent parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelState {
    pub taus: Vec<usize>,
    pub mus: Vec<f64>,
    pub sigmas: Vec<f64>,
}

impl ModelState {
    /// Flatten into the column order of [`SegmentationModel::parameter_names`].
    pub fn to_row(&self) -> Vec<f64> {
        self.taus
            .iter()
            .map(|&t| t as f64)
            .chain(self.mus.iter().copied())
            .chain(self.sigmas.iter().copied())
            .collect()
    }
}

impl SegmentationModel {
    pub fn new(values: &[f64], count: ChangePointCount) -> Result<Self, AppError> {
        let n = values.len();
        let min_n = 2 * count.k();
        if n < min_n {
            return Err(AppError::model(format!(
                "Series too short for {} change point(s): n={n} < {min_n}.",
                count.k()
            )));
        }
        if let Some(i) = values.iter().position(|v| !v.is_finite()) {
            return Err(AppError::model(format!("Non-finite return at index {i}.")));
        }

        // Rounding leaves a constant series with a std around 1e-17 · |y|, so
        // the degeneracy check is relative to the data magnitude.
        let data_std = std_pop(values);
        let scale = values.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        if !data_std.is_finite() || data_std <= RELATIVE_STD_FLOOR * scale {
            return Err(AppError::model(
                "Return series has zero variance; priors would be degenerate.",
            ));
        }

        let tau_bounds = match count {
            ChangePointCount::One => vec![(0, n - 1)],
            ChangePointCount::Three => vec![(0, n / 3), (n / 3, 2 * n / 3), (2 * n / 3, n - 1)],
        };

        let mut prefix_sum = Vec::with_capacity(n + 1);
        let mut prefix_sq = Vec::with_capacity(n + 1);
        prefix_sum.push(0.0);
        prefix_sq.push(0.0);
        for &y in values {
            prefix_sum.push(prefix_sum[prefix_sum.len() - 1] + y);
            prefix_sq.push(prefix_sq[prefix_sq.len() - 1] + y * y);
        }

        Ok(Self {
            count,
            n,
            data_std,
            mu_prior_sd: data_std / 10.0,
            sigma_prior_sd: data_std / 2.0,
            tau_bounds,
            prefix_sum,
            prefix_sq,
        })
    }

    pub fn count(&self) -> ChangePointCount {
        self.count
    }

    pub fn k(&self) -> usize {
        self.count.k()
    }

    pub fn regimes(&self) -> usize {
        self.count.regimes()
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn data_std(&self) -> f64 {
        self.data_std
    }

    pub fn mu_prior_sd(&self) -> f64 {
        self.mu_prior_sd
    }

    pub fn sigma_prior_sd(&self) -> f64 {
        self.sigma_prior_sd
    }

    pub fn tau_bounds(&self) -> &[(usize, usize)] {
        &self.tau_bounds
    }

    pub fn tau_names(&self) -> Vec<String> {
        match self.count {
            ChangePointCount::One => vec!["tau".to_string()],
            ChangePointCount::Three => (1..=3).map(|i| format!("tau_{i}")).collect(),
        }
    }

    /// Parameter names in column order: breakpoints, means, scales.
    pub fn parameter_names(&self) -> Vec<String> {
        let r = self.regimes();
        let mut names = self.tau_names();
        names.extend((1..=r).map(|i| format!("mu_{i}")));
        names.extend((1..=r).map(|i| format!("sigma_{i}")));
        names
    }

    /// Column index of `mu_{regime+1}`.
    pub fn mu_column(&self, regime: usize) -> usize {
        self.k() + regime
    }

    /// Column index of `sigma_{regime+1}`.
    pub fn sigma_column(&self, regime: usize) -> usize {
        self.k() + self.regimes() + regime
    }

    /// Half-open index range `[start, end)` covered by `regime`.
    pub fn segment_bounds(&self, taus: &[usize], regime: usize) -> (usize, usize) {
        let start = if regime == 0 { 0 } else { taus[regime - 1] + 1 };
        let end = if regime == taus.len() { self.n } else { taus[regime] + 1 };
        let end = end.min(self.n);
        (start.min(end), end)
    }

    pub fn segment_stats(&self, start: usize, end: usize) -> SegmentStats {
        SegmentStats {
            count: end - start,
            sum: self.prefix_sum[end] - self.prefix_sum[start],
            sum_sq: self.prefix_sq[end] - self.prefix_sq[start],
        }
    }

    pub fn regime_stats(&self, taus: &[usize], regime: usize) -> SegmentStats {
        let (start, end) = self.segment_bounds(taus, regime);
        self.segment_stats(start, end)
    }

    /// Total log-likelihood of the data under `state`.
    pub fn log_likelihood(&self, state: &ModelState) -> f64 {
        (0..self.regimes())
            .map(|r| {
                let stats = self.regime_stats(&state.taus, r);
                segment_log_likelihood(stats, state.mus[r], state.sigmas[r])
            })
            .sum()
    }

    /// Log prior density (up to the constant contributed by the uniform breakpoints).
    pub fn log_prior(&self, state: &ModelState) -> f64 {
        let in_support = state
            .taus
            .iter()
            .zip(&self.tau_bounds)
            .all(|(&t, &(lo, hi))| t >= lo && t <= hi);
        if !in_support {
            return f64::NEG_INFINITY;
        }
        let mu: f64 = state.mus.iter().map(|&m| self.log_prior_mu(m)).sum();
        let sigma: f64 = state.sigmas.iter().map(|&s| self.log_prior_sigma(s)).sum();
        mu + sigma
    }

    pub fn log_posterior(&self, state: &ModelState) -> f64 {
        let prior = self.log_prior(state);
        if !prior.is_finite() {
            return prior;
        }
        prior + self.log_likelihood(state)
    }

    pub fn log_prior_mu(&self, mu: f64) -> f64 {
        normal_log_pdf(mu, 0.0, self.mu_prior_sd)
    }

    pub fn log_prior_sigma(&self, sigma: f64) -> f64 {
        if sigma <= 0.0 {
            return f64::NEG_INFINITY;
        }
        // HalfNormal(s): 2 * N(x | 0, s) for x > 0.
        std::f64::consts::LN_2 + normal_log_pdf(sigma, 0.0, self.sigma_prior_sd)
    }
}

/// Regime index of time `t` for sorted breakpoints: `min{ i : τ_i ≥ t }`.
pub fn regime_of(taus: &[usize], t: usize) -> usize {
    taus.partition_point(|&tau| tau < t)
}

/// `Σ log N(y | mu, sigma)` over a segment described by its sufficient statistics.
pub fn segment_log_likelihood(stats: SegmentStats, mu: f64, sigma: f64) -> f64 {
    if stats.count == 0 {
        return 0.0;
    }
    if !(sigma > 0.0) {
        return f64::NEG_INFINITY;
    }
    let m = stats.count as f64;
    let ss = (stats.sum_sq - 2.0 * mu * stats.sum + m * mu * mu).max(0.0);
    -m * (sigma.ln() + 0.5 * (2.0 * PI).ln()) - ss / (2.0 * sigma * sigma)
}

fn normal_log_pdf(x: f64, mean: f64, sd: f64) -> f64 {
    let z = (x - mean) / sd;
    -0.5 * z * z - sd.ln() - 0.5 * (2.0 * PI).ln()
}
