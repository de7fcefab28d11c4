//! Resampling statistics: bootstrap confidence intervals and paired
//! permutation tests. Everything is seeded and deterministic.

use serde::{Deserialize, Serialize};

/// A percentile bootstrap interval around a pass rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
    pub level: f64,
    pub samples: usize,
}

impl ConfidenceInterval {
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Linear-interpolated percentile of an ascending slice, `q` in `0..=1`.
pub fn percentile(sorted: &[f64], q: f64) -> Option<f64> {
    let (first, last) = (sorted.first()?, sorted.last()?);
    if q <= 0.0 {
        return Some(*first);
    }
    if q >= 1.0 {
        return Some(*last);
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Mean of the group means, skipping empty groups.
pub fn mean_of_means(groups: &[Vec<f64>]) -> Option<f64> {
    let means: Vec<f64> = groups.iter().filter_map(|g| mean(g)).collect();
    mean(&means)
}

/// Stratified percentile bootstrap of [`mean_of_means`].
///
/// Every resample redraws each group with replacement, keeping its size,
/// then averages the per-group means. Returns `None` when there is nothing
/// to resample.
pub fn bootstrap_ci(
    groups: &[Vec<f64>],
    samples: usize,
    level: f64,
    seed: u64,
) -> Option<ConfidenceInterval> {
    let groups: Vec<&Vec<f64>> = groups.iter().filter(|g| !g.is_empty()).collect();
    if groups.is_empty() || samples == 0 {
        return None;
    }

    let mut rng = fastrand::Rng::with_seed(seed);
    let mut stats = Vec::with_capacity(samples);
    for _ in 0..samples {
        let mut total = 0.0;
        for group in &groups {
            let mut sum = 0.0;
            for _ in 0..group.len() {
                sum += group[rng.usize(..group.len())];
            }
            total += sum / group.len() as f64;
        }
        stats.push(total / groups.len() as f64);
    }
    stats.sort_by(f64::total_cmp);

    let alpha = (1.0 - level.clamp(0.0, 1.0)) / 2.0;
    Some(ConfidenceInterval {
        lower: percentile(&stats, alpha)?,
        upper: percentile(&stats, 1.0 - alpha)?,
        level,
        samples,
    })
}

/// Two-sided paired permutation test on per-fact scores.
///
/// `a[i]` and `b[i]` must be the two candidates' scores on the same fact.
/// Each iteration swaps every pair with probability one half; the p-value is
/// the share of iterations whose absolute mean difference reaches the
/// observed one, with the usual +1 correction.
pub fn permutation_test(a: &[f64], b: &[f64], iterations: usize, seed: u64) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let diffs: Vec<f64> = a.iter().zip(b).map(|(x, y)| x - y).collect();
    let n = diffs.len() as f64;
    let observed = (diffs.iter().sum::<f64>() / n).abs();

    let mut rng = fastrand::Rng::with_seed(seed);
    let mut extreme = 0usize;
    for _ in 0..iterations {
        let sum: f64 = diffs
            .iter()
            .map(|d| if rng.bool() { *d } else { -*d })
            .sum();
        if (sum / n).abs() >= observed - 1e-12 {
            extreme += 1;
        }
    }
    Some((extreme + 1) as f64 / (iterations + 1) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_interpolates() {
        let v = [0.0, 10.0, 20.0, 30.0];
        assert_eq!(percentile(&v, 0.0), Some(0.0));
        assert_eq!(percentile(&v, 1.0), Some(30.0));
        assert_eq!(percentile(&v, 0.5), Some(15.0));
        assert_eq!(percentile(&[], 0.5), None);
    }

    #[test]
    fn test_bootstrap_is_deterministic() {
        let groups = vec![
            vec![1.0, 0.0, 1.0, 1.0, 0.0, 1.0],
            vec![0.0, 0.0, 1.0],
        ];
        let a = bootstrap_ci(&groups, 500, 0.95, 7).unwrap();
        let b = bootstrap_ci(&groups, 500, 0.95, 7).unwrap();
        assert_eq!(a, b);
        assert!(a.lower <= a.upper);
        assert!(a.lower >= 0.0 && a.upper <= 1.0);
        assert!(a.contains(mean_of_means(&groups).unwrap()));
    }

    #[test]
    fn test_bootstrap_all_passing_has_zero_width() {
        let groups = vec![vec![1.0; 20]];
        let ci = bootstrap_ci(&groups, 100, 0.95, 1).unwrap();
        assert_eq!(ci.width(), 0.0);
        assert_eq!(ci.lower, 1.0);
    }

    #[test]
    fn test_bootstrap_empty() {
        assert!(bootstrap_ci(&[], 100, 0.95, 1).is_none());
        assert!(bootstrap_ci(&[vec![]], 100, 0.95, 1).is_none());
    }

    #[test]
    fn test_mean_of_means_weighs_groups_equally() {
        let groups = vec![vec![1.0; 9], vec![0.0], vec![]];
        assert_eq!(mean_of_means(&groups), Some(0.5));
    }

    #[test]
    fn test_permutation_identical_scores() {
        let a = vec![1.0, 0.0, 1.0, 1.0];
        let p = permutation_test(&a, &a, 200, 3).unwrap();
        assert_eq!(p, 1.0);
    }

    #[test]
    fn test_permutation_clear_difference() {
        let a = vec![1.0; 30];
        let b = vec![0.0; 30];
        let p = permutation_test(&a, &b, 1000, 3).unwrap();
        assert!(p < 0.01, "p = {p}");
        assert!(permutation_test(&a, &b[..10], 10, 3).is_none());
    }
}
