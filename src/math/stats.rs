//! Small descriptive statistics used by the model priors and the analyzer.

/// Arithmetic mean (NaN for an empty slice).
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Variance with `ddof` delta degrees of freedom (`0` = population, `1` = sample).
pub fn variance(values: &[f64], ddof: usize) -> f64 {
    let n = values.len();
    if n <= ddof {
        return f64::NAN;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (n - ddof) as f64
}

/// Population standard deviation.
pub fn std_pop(values: &[f64]) -> f64 {
    variance(values, 0).sqrt()
}

/// Most frequent value; ties resolve to the smallest value.
pub fn mode(values: &[usize]) -> Option<usize> {
    let max = *values.iter().max()?;
    let mut counts = vec![0usize; max + 1];
    for &v in values {
        counts[v] += 1;
    }
    // `max_by_key` returns the last maximum, so scan manually for the first.
    let mut best = 0usize;
    for (v, &c) in counts.iter().enumerate() {
        if c > counts[best] {
            best = v;
        }
    }
    Some(best)
}

/// Highest-density interval containing `prob` of the samples.
///
/// Uses the narrowest window over the sorted samples (unimodal assumption).
pub fn hdi(values: &[f64], prob: f64) -> Option<(f64, f64)> {
    if values.is_empty() || !(prob > 0.0 && prob <= 1.0) {
        return None;
    }
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let n = sorted.len();
    let width = ((prob * n as f64).floor() as usize).clamp(1, n);
    let mut best = (sorted[0], sorted[width - 1]);
    for i in 0..=(n - width) {
        let lo = sorted[i];
        let hi = sorted[i + width - 1];
        if hi - lo < best.1 - best.0 {
            best = (lo, hi);
        }
    }
    Some(best)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn population_std_matches_hand_computation() {
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((std_pop(&v) - 2.0).abs() < 1e-12);
        assert!((variance(&v, 1) - 32.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn mode_prefers_smallest_on_tie() {
        assert_eq!(mode(&[5, 3, 5, 3, 9]), Some(3));
        assert_eq!(mode(&[7, 7, 1]), Some(7));
        assert_eq!(mode(&[]), None);
    }

    #[test]
    fn hdi_picks_narrowest_window() {
        let v: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let (lo, hi) = hdi(&v, 0.9).unwrap();
        assert!((hi - lo - 89.0).abs() < 1e-12);

        let skewed = [0.0, 0.1, 0.2, 0.3, 10.0];
        assert_eq!(hdi(&skewed, 0.8).unwrap(), (0.0, 0.3));
    }
}
