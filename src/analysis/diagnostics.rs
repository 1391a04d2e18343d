//! Convergence diagnostics and per-parameter posterior summaries.
//!
//! - `r_hat`: Gelman-Rubin potential scale reduction on split chains
//! - `ess`: multi-chain effective sample size (Geyer initial positive sequence)
//! - 94% highest-density interval
//!
//! ```text
//! B = n/(m-1) Σ_j (x̄_j - x̄)²         between-chain
//! W = 1/m Σ_j s_j²                     within-chain
//! var⁺ = (n-1)/n · W + B/n
//! R̂ = sqrt(var⁺ / W)
//! ```

use crate::domain::{ConvergenceStatus, ConvergenceSummary, ParameterSummary};
use crate::fit::PosteriorSample;
use crate::math::{hdi, mean, variance};

/// `max(r_hat)` above this value flags the run as possibly unconverged.
pub const R_HAT_THRESHOLD: f64 = 1.1;

/// Probability mass of the reported HDI (`hdi_3%` .. `hdi_97%`).
pub const HDI_PROB: f64 = 0.94;

/// Summarize every parameter of the posterior.
pub fn summarize(posterior: &PosteriorSample) -> ConvergenceSummary {
    let parameters: Vec<ParameterSummary> = posterior
        .parameter_names
        .iter()
        .enumerate()
        .map(|(col, name)| {
            let chains: Vec<Vec<f64>> = (0..posterior.num_chains())
                .map(|c| posterior.chain_values(c, col))
                .collect();
            summarize_parameter(name, &chains)
        })
        .collect();

    let max_r_hat = parameters
        .iter()
        .map(|p| p.r_hat)
        .fold(f64::NEG_INFINITY, f64::max);
    let status = convergence_status(max_r_hat);

    ConvergenceSummary {
        parameters,
        max_r_hat,
        status,
    }
}

pub fn convergence_status(max_r_hat: f64) -> ConvergenceStatus {
    if max_r_hat > R_HAT_THRESHOLD || max_r_hat.is_nan() {
        ConvergenceStatus::Warning
    } else {
        ConvergenceStatus::Converged
    }
}

fn summarize_parameter(name: &str, chains: &[Vec<f64>]) -> ParameterSummary {
    let pooled: Vec<f64> = chains.iter().flatten().copied().collect();
    let (hdi_low, hdi_high) = hdi(&pooled, HDI_PROB).unwrap_or((f64::NAN, f64::NAN));
    ParameterSummary {
        name: name.to_string(),
        mean: mean(&pooled),
        sd: variance(&pooled, 1).sqrt(),
        hdi_low,
        hdi_high,
        ess: effective_sample_size(chains),
        r_hat: split_r_hat(chains),
    }
}

/// Gelman-Rubin `R̂` computed after splitting every chain in half.
///
/// Falls back to unsplit chains when they are too short to split. A parameter
/// that is constant everywhere yields `1.0`; constant-but-different chains
/// yield `+∞`.
pub fn split_r_hat(chains: &[Vec<f64>]) -> f64 {
    let min_len = chains.iter().map(Vec::len).min().unwrap_or(0);
    let halves: Vec<&[f64]> = if min_len >= 4 {
        let half = min_len / 2;
        chains
            .iter()
            .flat_map(|c| [&c[..half], &c[min_len - half..min_len]])
            .collect()
    } else {
        chains.iter().map(|c| &c[..min_len]).collect()
    };
    gelman_rubin(&halves)
}

fn gelman_rubin(chains: &[&[f64]]) -> f64 {
    let m = chains.len();
    let n = chains.iter().map(|c| c.len()).min().unwrap_or(0);
    if m < 2 || n < 2 {
        return f64::NAN;
    }

    let means: Vec<f64> = chains.iter().map(|c| mean(c)).collect();
    let w = mean(&chains.iter().map(|c| variance(c, 1)).collect::<Vec<_>>());
    let b = n as f64 * variance(&means, 1);

    if w <= 0.0 {
        return if b <= 0.0 { 1.0 } else { f64::INFINITY };
    }
    let var_plus = (n as f64 - 1.0) / n as f64 * w + b / n as f64;
    (var_plus / w).sqrt()
}

/// Multi-chain effective sample size.
///
/// Autocorrelations are combined across chains as in BDA3 and truncated with
/// Geyer's initial monotone positive sequence.
pub fn effective_sample_size(chains: &[Vec<f64>]) -> f64 {
    let m = chains.len();
    let n = chains.iter().map(Vec::len).min().unwrap_or(0);
    let total = (m * n) as f64;
    if m == 0 || n < 4 {
        return total;
    }

    let chains: Vec<&[f64]> = chains.iter().map(|c| &c[..n]).collect();
    let means: Vec<f64> = chains.iter().map(|c| mean(c)).collect();
    let w = mean(&chains.iter().map(|c| variance(c, 1)).collect::<Vec<_>>());
    let b_over_n = if m > 1 { variance(&means, 1) } else { 0.0 };
    let var_plus = (n as f64 - 1.0) / n as f64 * w + b_over_n;
    if !(var_plus > 0.0) {
        return total;
    }

    let rho = |lag: usize| -> f64 {
        let acov_mean = chains
            .iter()
            .zip(&means)
            .map(|(c, &mu)| autocovariance(c, mu, lag))
            .sum::<f64>()
            / m as f64;
        1.0 - (w - acov_mean) / var_plus
    };

    let mut sum = 0.0;
    let mut prev_pair = f64::INFINITY;
    let mut lag = 0;
    while lag + 1 < n {
        let r0 = if lag == 0 { 1.0 } else { rho(lag) };
        let pair = r0 + rho(lag + 1);
        if pair <= 0.0 {
            break;
        }
        let pair = pair.min(prev_pair);
        sum += pair;
        prev_pair = pair;
        lag += 2;
    }

    let tau = (-1.0 + 2.0 * sum).max(1.0 / total.log10().max(1.0));
    (total / tau).min(total * total.log10().max(1.0))
}

/// Biased (`/n`) autocovariance at `lag`.
fn autocovariance(x: &[f64], mu: f64, lag: usize) -> f64 {
    let n = x.len();
    if lag >= n {
        return 0.0;
    }
    x[..n - lag]
        .iter()
        .zip(&x[lag..])
        .map(|(a, b)| (a - mu) * (b - mu))
        .sum::<f64>()
        / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, Normal};

    fn iid_chain(seed: u64, n: usize, mu: f64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let dist = Normal::new(mu, 1.0).unwrap();
        (0..n).map(|_| dist.sample(&mut rng)).collect()
    }

    #[test]
    fn r_hat_near_one_for_mixed_chains() {
        let chains: Vec<Vec<f64>> = (0..4).map(|s| iid_chain(s, 2_000, 0.0)).collect();
        let r = split_r_hat(&chains);
        assert!((r - 1.0).abs() < 0.01, "r_hat {r}");
    }

    #[test]
    fn r_hat_flags_separated_chains() {
        let chains = vec![iid_chain(1, 500, 0.0), iid_chain(2, 500, 5.0)];
        assert!(split_r_hat(&chains) > R_HAT_THRESHOLD);
    }

    #[test]
    fn r_hat_of_constant_parameter_is_one() {
        let chains = vec![vec![3.0; 100], vec![3.0; 100]];
        assert_eq!(split_r_hat(&chains), 1.0);
        let stuck = vec![vec![3.0; 100], vec![4.0; 100]];
        assert_eq!(split_r_hat(&stuck), f64::INFINITY);
    }

    #[test]
    fn status_threshold_is_inclusive() {
        assert_eq!(convergence_status(1.0), ConvergenceStatus::Converged);
        assert_eq!(convergence_status(R_HAT_THRESHOLD), ConvergenceStatus::Converged);
        assert_eq!(convergence_status(1.100_000_1), ConvergenceStatus::Warning);
        assert_eq!(convergence_status(1.2), ConvergenceStatus::Warning);
        assert_eq!(convergence_status(f64::INFINITY), ConvergenceStatus::Warning);
        assert_eq!(convergence_status(f64::NAN), ConvergenceStatus::Warning);
    }

    #[test]
    fn stuck_chains_make_the_summary_a_warning() {
        let a = DMatrix::from_fn(40, 1, |_, _| 10.0);
        let b = DMatrix::from_fn(40, 1, |_, _| 30.0);
        let post = PosteriorSample::new(vec!["tau".into()], vec![a, b], Vec::new()).unwrap();

        let summary = summarize(&post);
        assert_eq!(summary.max_r_hat, f64::INFINITY);
        assert_eq!(summary.status, ConvergenceStatus::Warning);
        assert!(!summary.converged());
    }

    #[test]
    fn ess_of_iid_draws_is_close_to_draw_count() {
        let chains: Vec<Vec<f64>> = (10..14).map(|s| iid_chain(s, 1_000, 0.0)).collect();
        let ess = effective_sample_size(&chains);
        assert!(ess > 3_000.0 && ess < 5_000.0, "ess {ess}");
    }

    #[test]
    fn ess_drops_for_autocorrelated_chain() {
        // AR(1) with phi = 0.9 has tau ≈ 19.
        let mut rng = StdRng::seed_from_u64(3);
        let noise = Normal::new(0.0, 1.0).unwrap();
        let mut x = 0.0;
        let chain: Vec<f64> = (0..5_000)
            .map(|_| {
                x = 0.9 * x + noise.sample(&mut rng);
                x
            })
            .collect();
        let ess = effective_sample_size(&[chain]);
        assert!(ess < 600.0, "ess {ess}");
    }

    #[test]
    fn summary_covers_every_parameter() {
        let a = DMatrix::from_fn(50, 2, |i, j| if j == 0 { (i % 5) as f64 } else { i as f64 * 0.01 });
        let b = DMatrix::from_fn(50, 2, |i, j| if j == 0 { (i % 5) as f64 } else { i as f64 * 0.01 });
        let post = PosteriorSample::new(vec!["tau".into(), "mu_1".into()], vec![a, b], Vec::new()).unwrap();

        let summary = summarize(&post);
        assert_eq!(summary.parameters.len(), 2);
        let tau = summary.parameter("tau").unwrap();
        assert!((tau.mean - 2.0).abs() < 1e-12);
        assert!(summary.max_r_hat.is_finite());
    }
}
