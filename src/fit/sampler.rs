//! Metropolis-within-Gibbs sampler for the segmentation model.
//!
//! One iteration updates, in order:
//!
//! 1. each breakpoint `τ_j` with two Metropolis proposals:
//!    - a local random walk `τ_j ± U{1..step_j}`
//!    - an independent uniform draw over the breakpoint's prior support
//!
//!    Both are symmetric, so acceptance is the likelihood ratio of the two
//!    regimes adjacent to `τ_j` (the breakpoint prior is uniform).
//! 2. each regime mean `mu_i` from its exact conjugate normal full conditional
//! 3. each regime scale `sigma_i` with a slice-sampling step
//!
//! During the `tune` warm-up iterations the random-walk step of every
//! breakpoint is adapted toward a target acceptance rate; warm-up draws are
//! discarded.
//!
//! Chains are independent and run in parallel. Each chain seeds its own RNG
//! from `(seed, chain)`, so the output does not depend on thread scheduling.

use log::debug;
use nalgebra::DMatrix;
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::StandardNormal;
use rayon::prelude::*;

use crate::domain::{ChangePointCount, SamplerConfig};
use crate::error::AppError;
use crate::fit::posterior::{ChainStats, PosteriorSample};
use crate::math::slice_sample;
use crate::models::{ModelState, SegmentationModel, segment_log_likelihood};

/// Iterations per step-size adaptation window.
const ADAPT_WINDOW: usize = 100;

/// Target acceptance rate of the local breakpoint random walk.
const TARGET_ACCEPTANCE: f64 = 0.35;

/// Stepping-out budget of the scale slice sampler.
const SLICE_MAX_STEPS: usize = 20;

/// A fitted model together with its posterior draws.
#[derive(Debug, Clone)]
pub struct FitOutput {
    pub model: SegmentationModel,
    pub posterior: PosteriorSample,
}

/// Build the model for `values` and sample its posterior.
pub fn fit_change_points(
    values: &[f64],
    count: ChangePointCount,
    config: &SamplerConfig,
) -> Result<FitOutput, AppError> {
    config.validate()?;
    let model = SegmentationModel::new(values, count)?;
    let posterior = sample_posterior(&model, config)?;
    Ok(FitOutput { model, posterior })
}

/// Run `config.chains` independent chains and collect the retained draws.
pub fn sample_posterior(model: &SegmentationModel, config: &SamplerConfig) -> Result<PosteriorSample, AppError> {
    config.validate()?;

    let outputs: Vec<(DMatrix<f64>, ChainStats)> = (0..config.chains)
        .into_par_iter()
        .map(|chain| run_chain(model, config, chain))
        .collect();

    let (chains, stats): (Vec<_>, Vec<_>) = outputs.into_iter().unzip();
    PosteriorSample::new(model.parameter_names(), chains, stats)
}

/// Per-chain seed derived with a SplitMix64 finalizer.
pub fn chain_seed(seed: u64, chain: usize) -> u64 {
    let mut z = seed.wrapping_add((chain as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn run_chain(model: &SegmentationModel, config: &SamplerConfig, chain: usize) -> (DMatrix<f64>, ChainStats) {
    let mut rng = StdRng::seed_from_u64(chain_seed(config.seed, chain));
    let k = model.k();
    let p = model.parameter_names().len();

    let mut state = initial_state(model, &mut rng);

    // Random-walk half-width per breakpoint, kept as f64 so small adaptation
    // factors accumulate.
    let mut step_scale: Vec<f64> = model
        .tau_bounds()
        .iter()
        .map(|&(lo, hi)| ((hi - lo) as f64 / 20.0).max(1.0))
        .collect();
    let mut window_accepted = vec![0usize; k];
    let mut kept_accepted = vec![0usize; k];

    let mut draws = DMatrix::<f64>::zeros(config.draws, p);
    let total = config.tune + config.draws;

    for iter in 0..total {
        for j in 0..k {
            let step = step_scale[j].round().max(1.0) as usize;
            let local = propose_local(model, &state, j, step, &mut rng);
            if update_tau(model, &mut state, j, local, &mut rng) {
                window_accepted[j] += 1;
                if iter >= config.tune {
                    kept_accepted[j] += 1;
                }
            }
            let (lo, hi) = model.tau_bounds()[j];
            let global = rng.gen_range(lo..=hi);
            update_tau(model, &mut state, j, Some(global), &mut rng);
        }

        for r in 0..model.regimes() {
            state.mus[r] = draw_mu(model, &state, r, &mut rng);
        }
        for r in 0..model.regimes() {
            state.sigmas[r] = draw_sigma(model, &state, r, &mut rng);
        }

        if iter < config.tune && (iter + 1) % ADAPT_WINDOW == 0 {
            for j in 0..k {
                let rate = window_accepted[j] as f64 / ADAPT_WINDOW as f64;
                let (lo, hi) = model.tau_bounds()[j];
                let factor = if rate > TARGET_ACCEPTANCE { 1.1 } else { 0.9 };
                step_scale[j] = (step_scale[j] * factor).clamp(1.0, ((hi - lo) as f64).max(1.0));
                window_accepted[j] = 0;
            }
        }

        if iter >= config.tune {
            let row = iter - config.tune;
            for (col, value) in state.to_row().into_iter().enumerate() {
                draws[(row, col)] = value;
            }
        }
    }

    let tau_acceptance: Vec<f64> = kept_accepted
        .iter()
        .map(|&a| a as f64 / config.draws as f64)
        .collect();
    let tau_step: Vec<usize> = step_scale.iter().map(|s| s.round() as usize).collect();
    debug!(
        "chain {chain}: tau acceptance {:?}, tuned step {:?}",
        tau_acceptance, tau_step
    );

    (
        draws,
        ChainStats {
            chain,
            tau_acceptance,
            tau_step,
        },
    )
}

/// Breakpoints uniform over their supports, means at the prior center, scales at `std(y)`.
fn initial_state<R: Rng + ?Sized>(model: &SegmentationModel, rng: &mut R) -> ModelState {
    let mut taus: Vec<usize> = model
        .tau_bounds()
        .iter()
        .map(|&(lo, hi)| rng.gen_range(lo..=hi))
        .collect();
    taus.sort_unstable();
    ModelState {
        taus,
        mus: vec![0.0; model.regimes()],
        sigmas: vec![model.data_std(); model.regimes()],
    }
}

fn propose_local<R: Rng + ?Sized>(
    model: &SegmentationModel,
    state: &ModelState,
    j: usize,
    step: usize,
    rng: &mut R,
) -> Option<usize> {
    let delta = rng.gen_range(1..=step);
    let current = state.taus[j];
    let proposal = if rng.r#gen::<bool>() {
        current.checked_add(delta)?
    } else {
        current.checked_sub(delta)?
    };
    let (lo, hi) = model.tau_bounds()[j];
    (lo..=hi).contains(&proposal).then_some(proposal)
}

/// Metropolis accept/reject of moving `τ_j` to `proposal`. Returns true on acceptance.
fn update_tau<R: Rng + ?Sized>(
    model: &SegmentationModel,
    state: &mut ModelState,
    j: usize,
    proposal: Option<usize>,
    rng: &mut R,
) -> bool {
    let Some(proposal) = proposal else {
        // Out-of-support proposals are rejections; consume the uniform anyway
        // so the random stream does not depend on where the proposal landed.
        let _: f64 = rng.r#gen();
        return false;
    };

    // Keep breakpoints ordered (automatic for the disjoint k = 3 supports).
    let below_ok = j == 0 || state.taus[j - 1] <= proposal;
    let above_ok = j + 1 == state.taus.len() || proposal <= state.taus[j + 1];
    let u: f64 = rng.r#gen();
    if !(below_ok && above_ok) || proposal == state.taus[j] {
        return false;
    }

    let current = adjacent_log_likelihood(model, state, j);
    let previous = state.taus[j];
    state.taus[j] = proposal;
    let candidate = adjacent_log_likelihood(model, state, j);

    let log_alpha = candidate - current;
    if log_alpha >= 0.0 || (1.0 - u).ln() < log_alpha {
        true
    } else {
        state.taus[j] = previous;
        false
    }
}

/// Log-likelihood of the two regimes separated by `τ_j`.
fn adjacent_log_likelihood(model: &SegmentationModel, state: &ModelState, j: usize) -> f64 {
    [j, j + 1]
        .into_iter()
        .map(|r| {
            let stats = model.regime_stats(&state.taus, r);
            segment_log_likelihood(stats, state.mus[r], state.sigmas[r])
        })
        .sum()
}

/// Exact draw from `mu_r | τ, sigma_r, y` (normal prior, normal likelihood).
fn draw_mu<R: Rng + ?Sized>(model: &SegmentationModel, state: &ModelState, r: usize, rng: &mut R) -> f64 {
    let stats = model.regime_stats(&state.taus, r);
    let s0 = model.mu_prior_sd();
    let sigma = state.sigmas[r];

    let precision = 1.0 / (s0 * s0) + stats.count as f64 / (sigma * sigma);
    let mean = (stats.sum / (sigma * sigma)) / precision;
    let z: f64 = rng.sample(StandardNormal);
    mean + z / precision.sqrt()
}

fn draw_sigma<R: Rng + ?Sized>(model: &SegmentationModel, state: &ModelState, r: usize, rng: &mut R) -> f64 {
    let stats = model.regime_stats(&state.taus, r);
    let mu = state.mus[r];
    let log_density = |s: f64| {
        let prior = model.log_prior_sigma(s);
        if prior.is_finite() {
            prior + segment_log_likelihood(stats, mu, s)
        } else {
            prior
        }
    };
    slice_sample(rng, state.sigmas[r], log_density, model.sigma_prior_sd(), SLICE_MAX_STEPS)
}
