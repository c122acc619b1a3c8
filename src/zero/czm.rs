//! Count-zero multiplicative (CZM) replacement of zero counts.
//!
//! Each zero in sample `i` is treated as a part below the sample's detection
//! limit, taken as `threshold` times its smallest observed proportion `m_i`,
//! and replaced by the proportion `frac * threshold * m_i`. For integer counts
//! with a singleton present this is `frac * threshold / n_i`. The observed
//! proportions are shrunk by the total mass handed to the replacements, so
//! ratios between non-zero parts are unchanged and the sample total is
//! preserved. Every quantity is a proportion, so multiplying a sample's counts
//! by a constant leaves its replaced proportions unchanged.

use crate::data::{CountMatrix, LabeledMatrix};
use crate::error::{CodaError, Result};
use crate::profile::profile_sparsity;
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

const STAGE: &str = "zero replacement";

/// Parameters of the CZM replacement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CzmConfig {
    /// Fraction of the detection limit used as replacement value.
    #[serde(default = "default_frac")]
    pub frac: f64,
    /// Detection limit, in units of the sample's smallest observed proportion.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Zero fraction above which a feature or sample triggers a sparsity warning.
    #[serde(default = "default_z_warning")]
    pub z_warning: f64,
    /// Lower replacements that exceed the smallest observed proportion of their feature.
    #[serde(default = "default_adjust")]
    pub adjust: bool,
}

fn default_frac() -> f64 {
    0.65
}

fn default_threshold() -> f64 {
    0.5
}

fn default_z_warning() -> f64 {
    0.8
}

fn default_adjust() -> bool {
    true
}

impl Default for CzmConfig {
    fn default() -> Self {
        Self {
            frac: default_frac(),
            threshold: default_threshold(),
            z_warning: default_z_warning(),
            adjust: default_adjust(),
        }
    }
}

impl CzmConfig {
    fn validate(&self) -> Result<()> {
        if !(self.frac > 0.0 && self.frac < 1.0) {
            return Err(CodaError::InvalidParameter(
                "frac must be in (0, 1)".to_string(),
            ));
        }
        if !(self.threshold > 0.0 && self.threshold.is_finite()) {
            return Err(CodaError::InvalidParameter(
                "threshold must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.z_warning) {
            return Err(CodaError::InvalidParameter(
                "z_warning must be between 0 and 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// What a sparsity warning refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SparsityScope {
    Feature,
    Sample,
}

/// Advisory: replacement on this feature or sample may be unreliable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparsityWarning {
    pub scope: SparsityScope,
    pub id: String,
    pub zero_fraction: f64,
    pub limit: f64,
}

impl std::fmt::Display for SparsityWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scope = match self.scope {
            SparsityScope::Feature => "feature",
            SparsityScope::Sample => "sample",
        };
        write!(
            f,
            "{} '{}' is {:.1}% zeros (limit {:.1}%)",
            scope,
            self.id,
            self.zero_fraction * 100.0,
            self.limit * 100.0
        )
    }
}

/// Strictly positive pseudo-counts, samples × features.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PseudoCountTable {
    /// Pseudo-counts; each row sums to the sample's original total.
    pub matrix: LabeledMatrix,
    /// Original sample totals.
    pub library_sizes: Vec<f64>,
    /// Number of zero cells that were replaced.
    pub n_replaced: usize,
    /// Number of replacements lowered to the feature's minimum observed proportion.
    pub n_adjusted: usize,
    /// Sparsity warnings raised while replacing.
    pub warnings: Vec<SparsityWarning>,
}

impl PseudoCountTable {
    /// Number of samples.
    pub fn n_samples(&self) -> usize {
        self.matrix.n_samples()
    }

    /// Number of features.
    pub fn n_features(&self) -> usize {
        self.matrix.n_features()
    }

    /// Sample identifiers.
    pub fn sample_ids(&self) -> &[String] {
        &self.matrix.sample_ids
    }

    /// Feature identifiers.
    pub fn feature_ids(&self) -> &[String] {
        &self.matrix.feature_ids
    }
}

/// Collect sparsity warnings for features and samples above `z_warning`.
pub fn sparsity_warnings(counts: &CountMatrix, z_warning: f64) -> Vec<SparsityWarning> {
    let profile = profile_sparsity(counts);
    let features = profile.features_above(z_warning).into_iter().map(|f| SparsityWarning {
        scope: SparsityScope::Feature,
        id: profile.feature_ids[f].clone(),
        zero_fraction: profile.feature_zero_fraction[f],
        limit: z_warning,
    });
    let samples = profile.samples_above(z_warning).into_iter().map(|s| SparsityWarning {
        scope: SparsityScope::Sample,
        id: profile.sample_ids[s].clone(),
        zero_fraction: profile.sample_zero_fraction[s],
        limit: z_warning,
    });
    features.chain(samples).collect()
}

/// Replace zeros with the count-zero multiplicative method.
///
/// Fails with a structural error if any sample is entirely zero; such samples
/// must be removed beforehand.
pub fn replace_zeros_czm(counts: &CountMatrix, config: &CzmConfig) -> Result<PseudoCountTable> {
    config.validate()?;
    let n_samples = counts.n_samples();
    let n_features = counts.n_features();
    if n_samples == 0 || n_features == 0 {
        return Err(CodaError::EmptyData(
            "Cannot replace zeros in an empty matrix".to_string(),
        ));
    }

    let library_sizes: Vec<f64> = counts.col_sums().into_iter().map(|n| n as f64).collect();
    if let Some(s) = library_sizes.iter().position(|&n| n == 0.0) {
        return Err(CodaError::Structural {
            stage: STAGE,
            id: counts.sample_ids()[s].clone(),
            reason: "has all features zero; remove it before replacement".to_string(),
        });
    }

    let warnings = sparsity_warnings(counts, config.z_warning);
    for w in &warnings {
        log::warn!("Sparsity: {}; replacement may be unreliable", w);
    }

    // samples × features, closed to proportions
    let observed = counts.to_sample_major();
    let mut closed = observed.clone();
    for (s, mut row) in closed.row_iter_mut().enumerate() {
        row /= library_sizes[s];
    }

    // Smallest observed proportion per feature
    let column_min: Vec<Option<f64>> = closed
        .column_iter()
        .map(|col| {
            col.iter()
                .copied()
                .filter(|&p| p > 0.0)
                .min_by(f64::total_cmp)
        })
        .collect();

    let rows: Vec<(Vec<f64>, usize, usize)> = (0..n_samples)
        .into_par_iter()
        .map(|s| {
            let row_min = closed
                .row(s)
                .iter()
                .copied()
                .filter(|&p| p > 0.0)
                .min_by(f64::total_cmp)
                .unwrap_or(1.0);
            let limit = config.frac * config.threshold * row_min;
            let mut replaced = 0;
            let mut adjusted = 0;
            let mut repl = vec![0.0; n_features];
            for f in 0..n_features {
                if observed[(s, f)] > 0.0 {
                    continue;
                }
                replaced += 1;
                repl[f] = match column_min[f] {
                    Some(min) if config.adjust && limit > min => {
                        adjusted += 1;
                        config.frac * min
                    }
                    _ => limit,
                };
            }

            let mass: f64 = repl.iter().sum();
            if mass >= 1.0 {
                return Err(CodaError::NumericalDegeneracy {
                    stage: STAGE,
                    reason: format!(
                        "replacements for sample '{}' sum to {:.3}, leaving no mass for observed parts",
                        counts.sample_ids()[s],
                        mass
                    ),
                });
            }

            let row: Vec<f64> = (0..n_features)
                .map(|f| {
                    let p = if observed[(s, f)] > 0.0 {
                        closed[(s, f)] * (1.0 - mass)
                    } else {
                        repl[f]
                    };
                    p * library_sizes[s]
                })
                .collect();
            Ok((row, replaced, adjusted))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut data = DMatrix::zeros(n_samples, n_features);
    let mut n_replaced = 0;
    let mut n_adjusted = 0;
    for (s, (row, replaced, adjusted)) in rows.into_iter().enumerate() {
        for (f, v) in row.into_iter().enumerate() {
            data[(s, f)] = v;
        }
        n_replaced += replaced;
        n_adjusted += adjusted;
    }

    if n_adjusted > 0 {
        log::warn!(
            "{} replacement values exceeded their feature's smallest observed proportion and were lowered",
            n_adjusted
        );
    }
    log::debug!("CZM replaced {} zero cells", n_replaced);

    Ok(PseudoCountTable {
        matrix: LabeledMatrix::new(
            data,
            counts.sample_ids().to_vec(),
            counts.feature_ids().to_vec(),
        )?,
        library_sizes,
        n_replaced,
        n_adjusted,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn example_counts() -> CountMatrix {
        let rows = vec![vec![10, 0, 5], vec![0, 8, 2], vec![6, 6, 0], vec![1, 1, 1]];
        CountMatrix::from_sample_rows(
            &rows,
            vec!["a".into(), "b".into(), "c".into()],
            (1..=4).map(|i| format!("S{}", i)).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_no_zeros_remain() {
        let table = replace_zeros_czm(&example_counts(), &CzmConfig::default()).unwrap();
        assert_eq!(table.n_replaced, 3);
        assert!(table.matrix.data.iter().all(|&v| v > 0.0));
    }

    #[test]
    fn test_totals_preserved() {
        let table = replace_zeros_czm(&example_counts(), &CzmConfig::default()).unwrap();
        for (sum, lib) in table.matrix.row_sums().iter().zip(&table.library_sizes) {
            assert_relative_eq!(*sum, *lib, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_nonzero_ratios_preserved() {
        let table = replace_zeros_czm(&example_counts(), &CzmConfig::default()).unwrap();
        // Sample S1 = [10, 0, 5]
        assert_relative_eq!(table.matrix.get(0, 0) / table.matrix.get(0, 2), 2.0, epsilon = 1e-12);
        // Sample S4 has no zeros and is untouched
        assert_relative_eq!(table.matrix.get(3, 1), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_replacement_value() {
        let config = CzmConfig {
            adjust: false,
            ..CzmConfig::default()
        };
        let table = replace_zeros_czm(&example_counts(), &config).unwrap();
        // S1 = [10, 0, 5]: smallest observed proportion 1/3, times 15 counts
        assert_relative_eq!(table.matrix.get(0, 1), 0.65 * 0.5 * 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_adjustment_caps_at_column_minimum() {
        // S2 = [1, 1, 0] would get 0.65 * 0.5 * 0.5 = 0.1625 for feature c, but the
        // smallest observed proportion of c is 5 / 1000, so it is lowered to 0.65 * 0.005.
        let rows = vec![vec![5, 990, 5], vec![1, 1, 0]];
        let counts = CountMatrix::from_sample_rows(
            &rows,
            vec!["a".into(), "b".into(), "c".into()],
            vec!["S1".into(), "S2".into()],
        )
        .unwrap();
        let table = replace_zeros_czm(&counts, &CzmConfig::default()).unwrap();

        assert_eq!(table.n_adjusted, 1);
        assert_relative_eq!(table.matrix.get(1, 2) / 2.0, 0.65 * 0.005, epsilon = 1e-12);
    }

    #[test]
    fn test_scaled_sample_keeps_proportions() {
        let base = replace_zeros_czm(&example_counts(), &CzmConfig::default()).unwrap();
        let rows = vec![vec![100, 0, 50], vec![0, 8, 2], vec![6, 6, 0], vec![1, 1, 1]];
        let scaled_counts = CountMatrix::from_sample_rows(
            &rows,
            vec!["a".into(), "b".into(), "c".into()],
            (1..=4).map(|i| format!("S{}", i)).collect(),
        )
        .unwrap();
        let scaled = replace_zeros_czm(&scaled_counts, &CzmConfig::default()).unwrap();

        for s in 0..4 {
            for f in 0..3 {
                assert_relative_eq!(
                    base.matrix.get(s, f) / base.library_sizes[s],
                    scaled.matrix.get(s, f) / scaled.library_sizes[s],
                    max_relative = 1e-12
                );
            }
        }
    }

    #[test]
    fn test_all_zero_sample_fails_fast() {
        let counts = CountMatrix::from_sample_rows(
            &[vec![3, 4], vec![0, 0]],
            vec!["a".into(), "b".into()],
            vec!["S1".into(), "S2".into()],
        )
        .unwrap();
        let err = replace_zeros_czm(&counts, &CzmConfig::default()).unwrap_err();
        assert!(err.is_structural());
        assert!(err.to_string().contains("S2"));
    }

    #[test]
    fn test_sparsity_warning_continues() {
        // Feature c is zero in 3 of 4 samples (75%) and feature b in 1 of 4
        let rows = vec![vec![4, 1, 0], vec![5, 0, 0], vec![6, 2, 0], vec![7, 3, 1]];
        let counts = CountMatrix::from_sample_rows(
            &rows,
            vec!["a".into(), "b".into(), "c".into()],
            (1..=4).map(|i| format!("S{}", i)).collect(),
        )
        .unwrap();
        let config = CzmConfig {
            z_warning: 0.5,
            ..CzmConfig::default()
        };
        let table = replace_zeros_czm(&counts, &config).unwrap();

        assert!(table
            .warnings
            .iter()
            .any(|w| w.scope == SparsityScope::Feature && w.id == "c"));
        assert!(table.matrix.data.iter().all(|&v| v > 0.0));
    }

    #[test]
    fn test_invalid_config() {
        let counts = example_counts();
        let bad = CzmConfig {
            frac: 1.5,
            ..CzmConfig::default()
        };
        assert!(replace_zeros_czm(&counts, &bad).is_err());
        let bad = CzmConfig {
            threshold: 0.0,
            ..CzmConfig::default()
        };
        assert!(replace_zeros_czm(&counts, &bad).is_err());
    }
}
