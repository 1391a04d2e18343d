//! Univariate slice sampler (stepping-out + shrinkage).
//!
//! Used for the regime scales, whose half-normal prior is not conjugate to the
//! normal likelihood. Given the current point `x0` and an unnormalized log
//! density `f`, one call returns a new point whose stationary distribution is
//! proportional to `exp(f)`:
//!
//! ```text
//! y  = f(x0) - Exp(1)                  (slice height)
//! [L, R] placed randomly around x0, stepped out by `width` while f > y
//! draw x1 ~ U(L, R); shrink the bracket toward x0 until f(x1) > y
//! ```
//!
//! Points outside the support must evaluate to `f64::NEG_INFINITY`.

use rand::Rng;

/// Maximum shrinkage iterations before giving up and keeping `x0`.
const MAX_SHRINK: usize = 200;

pub fn slice_sample<R, F>(rng: &mut R, x0: f64, log_density: F, width: f64, max_steps: usize) -> f64
where
    R: Rng + ?Sized,
    F: Fn(f64) -> f64,
{
    let f0 = log_density(x0);
    if !f0.is_finite() || !(width.is_finite() && width > 0.0) {
        return x0;
    }

    // `1 - U` lies in (0, 1], so the log is finite.
    let u: f64 = rng.r#gen();
    let level = f0 + (1.0 - u).ln();

    let mut left = x0 - width * rng.r#gen::<f64>();
    let mut right = left + width;

    let j = (max_steps as f64 * rng.r#gen::<f64>()).floor() as usize;
    let mut k = max_steps.saturating_sub(1).saturating_sub(j);
    let mut j = j;
    while j > 0 && log_density(left) > level {
        left -= width;
        j -= 1;
    }
    while k > 0 && log_density(right) > level {
        right += width;
        k -= 1;
    }

    for _ in 0..MAX_SHRINK {
        let x1 = left + rng.r#gen::<f64>() * (right - left);
        if log_density(x1) > level {
            return x1;
        }
        if x1 < x0 {
            left = x1;
        } else {
            right = x1;
        }
    }

    x0
}
