//! Benjamini-Hochberg false discovery rate control.

use serde::{Deserialize, Serialize};

/// Raw and BH-adjusted p-values for a set of features.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BhCorrected {
    /// Feature IDs, in input order.
    pub feature_ids: Vec<String>,
    /// Raw p-values.
    pub p_values: Vec<f64>,
    /// Adjusted p-values; NaN where the raw p-value was undefined.
    pub q_values: Vec<f64>,
    /// Number of defined p-values that entered the correction.
    pub n_tests: usize,
}

impl BhCorrected {
    /// q-value of a feature.
    pub fn q_value(&self, feature_id: &str) -> Option<f64> {
        let idx = self.feature_ids.iter().position(|f| f == feature_id)?;
        self.q_values.get(idx).copied()
    }

    /// Number of features with q below `alpha`.
    pub fn n_significant(&self, alpha: f64) -> usize {
        self.q_values.iter().filter(|&&q| q < alpha).count()
    }
}

/// BH step-up adjustment: `q_(i) = min_{j >= i} p_(j) * m / j`, capped at 1.
///
/// NaN p-values do not count towards `m` and stay NaN.
pub fn bh_adjust(p_values: &[f64]) -> Vec<f64> {
    let mut ranked: Vec<usize> = (0..p_values.len())
        .filter(|&i| !p_values[i].is_nan())
        .collect();
    ranked.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));

    let m = ranked.len() as f64;
    let mut q_values = vec![f64::NAN; p_values.len()];
    let mut running = 1.0_f64;
    for (pos, &i) in ranked.iter().enumerate().rev() {
        running = running.min(p_values[i] * m / (pos + 1) as f64);
        q_values[i] = running;
    }
    q_values
}

/// Apply BH correction to per-feature p-values.
pub fn correct_bh(p_values: &[f64], feature_ids: &[String]) -> BhCorrected {
    BhCorrected {
        feature_ids: feature_ids.to_vec(),
        p_values: p_values.to_vec(),
        q_values: bh_adjust(p_values),
        n_tests: p_values.iter().filter(|p| !p.is_nan()).count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{}", i)).collect()
    }

    #[test]
    fn test_hand_computed() {
        // m = 5: 0.025, 0.025, 0.0333, 0.05, 0.1
        let q = bh_adjust(&[0.005, 0.01, 0.02, 0.04, 0.1]);
        let expected = [0.025, 0.025, 1.0 / 30.0, 0.05, 0.1];
        for (a, b) in q.iter().zip(expected) {
            assert_relative_eq!(*a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_input_order_preserved() {
        let q = bh_adjust(&[0.04, 0.01, 0.03, 0.005]);
        assert_relative_eq!(q[3], 0.02, epsilon = 1e-12);
        assert_relative_eq!(q[1], 0.02, epsilon = 1e-12);
        assert_relative_eq!(q[2], 0.04, epsilon = 1e-12);
        assert_relative_eq!(q[0], 0.04, epsilon = 1e-12);
    }

    #[test]
    fn test_capped_at_one() {
        let q = bh_adjust(&[0.9, 0.95, 0.99]);
        assert!(q.iter().all(|&v| v <= 1.0));
    }

    #[test]
    fn test_nan_left_out() {
        let corrected = correct_bh(&[0.01, f64::NAN, 0.04], &ids(3));
        assert_eq!(corrected.n_tests, 2);
        assert!(corrected.q_values[1].is_nan());
        assert_relative_eq!(corrected.q_values[0], 0.02, epsilon = 1e-12);
        assert_relative_eq!(corrected.q_values[2], 0.04, epsilon = 1e-12);
        assert_eq!(corrected.q_value("f2"), Some(0.04));
        assert_eq!(corrected.n_significant(0.03), 1);
    }

    #[test]
    fn test_empty() {
        let corrected = correct_bh(&[], &[]);
        assert_eq!(corrected.n_tests, 0);
        assert!(corrected.q_values.is_empty());
    }
}
