//! Wilcoxon rank-sum (Mann-Whitney) test.

use super::{GroupTest, TestOutcome};
use crate::error::{CodaError, Result};
use statrs::distribution::{ContinuousCDF, Normal};

/// Rank-sum test using the normal approximation with tie and continuity
/// corrections.
#[derive(Debug, Clone, Copy, Default)]
pub struct WilcoxonTest;

/// Mid-ranks of `values` (1-based) and the tie term `Σ (t³ - t)`.
fn mid_ranks(values: &[f64]) -> (Vec<f64>, f64) {
    let mut idx: Vec<usize> = (0..values.len()).collect();
    idx.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut ties = 0.0;
    let mut start = 0;
    while start < idx.len() {
        let mut end = start + 1;
        while end < idx.len() && values[idx[end]] == values[idx[start]] {
            end += 1;
        }
        let rank = (start + end + 1) as f64 / 2.0;
        for &i in &idx[start..end] {
            ranks[i] = rank;
        }
        let t = (end - start) as f64;
        ties += t * t * t - t;
        start = end;
    }
    (ranks, ties)
}

impl GroupTest for WilcoxonTest {
    fn name(&self) -> &'static str {
        "wilcoxon"
    }

    fn test(&self, reference: &[f64], comparison: &[f64]) -> Result<TestOutcome> {
        if reference.is_empty() || comparison.is_empty() {
            return Err(CodaError::InvalidParameter(
                "rank-sum test needs samples in both groups".to_string(),
            ));
        }

        let n_cmp = comparison.len() as f64;
        let n_ref = reference.len() as f64;
        let n = n_cmp + n_ref;

        let pooled: Vec<f64> = comparison.iter().chain(reference).copied().collect();
        let (ranks, ties) = mid_ranks(&pooled);
        let rank_sum: f64 = ranks[..comparison.len()].iter().sum();
        let statistic = rank_sum - n_cmp * (n_cmp + 1.0) / 2.0;

        let centered = statistic - n_cmp * n_ref / 2.0;
        let sigma = (n_cmp * n_ref / 12.0 * ((n + 1.0) - ties / (n * (n - 1.0)))).sqrt();
        if !(sigma > 0.0) {
            return Ok(TestOutcome {
                statistic,
                p_value: f64::NAN,
                df: None,
            });
        }

        let correction = 0.5 * centered.signum() * f64::from(centered != 0.0);
        let z = (centered - correction) / sigma;
        let normal = Normal::new(0.0, 1.0).map_err(|e| CodaError::NumericalDegeneracy {
            stage: "group test",
            reason: e.to_string(),
        })?;
        let p_value = (2.0 * normal.cdf(z).min(1.0 - normal.cdf(z))).min(1.0);

        Ok(TestOutcome {
            statistic,
            p_value,
            df: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mid_ranks() {
        let (ranks, ties) = mid_ranks(&[3.0, 1.0, 3.0, 2.0]);
        assert_eq!(ranks, vec![3.5, 1.0, 3.5, 2.0]);
        assert_relative_eq!(ties, 6.0);
    }

    #[test]
    fn test_separated_groups() {
        let out = WilcoxonTest.test(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]).unwrap();
        assert_relative_eq!(out.statistic, 9.0);

        // sigma^2 = 9 / 12 * 7, corrected |z| = (4.5 - 0.5) / sigma
        let z = 4.0 / 5.25_f64.sqrt();
        let normal = Normal::new(0.0, 1.0).unwrap();
        assert_relative_eq!(out.p_value, 2.0 * (1.0 - normal.cdf(z)), epsilon = 1e-12);
    }

    #[test]
    fn test_ties_use_mid_ranks() {
        let out = WilcoxonTest.test(&[1.0, 1.0, 2.0], &[2.0, 3.0, 3.0]).unwrap();
        // comparison ranks 3.5 + 5.5 + 5.5, minus 3 * 4 / 2
        assert_relative_eq!(out.statistic, 8.5);
        assert!(out.p_value > 0.0 && out.p_value < 1.0);
    }

    #[test]
    fn test_identical_values_undefined() {
        let out = WilcoxonTest.test(&[2.0, 2.0], &[2.0, 2.0]).unwrap();
        assert!(out.p_value.is_nan());
    }

    #[test]
    fn test_no_shift_gives_p_one() {
        let out = WilcoxonTest.test(&[1.0, 4.0], &[2.0, 3.0]).unwrap();
        assert_relative_eq!(out.statistic, 2.0);
        assert_relative_eq!(out.p_value, 1.0, epsilon = 1e-12);
    }
}
