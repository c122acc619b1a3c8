//! Sparsity profiling: zero fractions per feature and per sample.

use crate::data::CountMatrix;
use serde::{Deserialize, Serialize};

/// Zero fractions of a count matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparsityProfile {
    /// Feature identifiers, aligned with `feature_zero_fraction`.
    pub feature_ids: Vec<String>,
    /// Sample identifiers, aligned with `sample_zero_fraction`.
    pub sample_ids: Vec<String>,
    /// Overall proportion of zero entries.
    pub sparsity: f64,
    /// Proportion of samples in which each feature is zero.
    pub feature_zero_fraction: Vec<f64>,
    /// Proportion of features that are zero in each sample.
    pub sample_zero_fraction: Vec<f64>,
    /// Median of `feature_zero_fraction`.
    pub median_feature_sparsity: f64,
    /// Median of `sample_zero_fraction`.
    pub median_sample_sparsity: f64,
}

impl SparsityProfile {
    /// Indices of features whose zero fraction exceeds `limit`.
    pub fn features_above(&self, limit: f64) -> Vec<usize> {
        above(&self.feature_zero_fraction, limit)
    }

    /// Indices of samples whose zero fraction exceeds `limit`.
    pub fn samples_above(&self, limit: f64) -> Vec<usize> {
        above(&self.sample_zero_fraction, limit)
    }
}

fn above(values: &[f64], limit: f64) -> Vec<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, &v)| v > limit)
        .map(|(i, _)| i)
        .collect()
}

impl std::fmt::Display for SparsityProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Sparsity Profile")?;
        writeln!(f, "  Features: {}", self.feature_ids.len())?;
        writeln!(f, "  Samples:  {}", self.sample_ids.len())?;
        writeln!(f, "  Overall sparsity:        {:.2}%", self.sparsity * 100.0)?;
        writeln!(f, "  Median feature sparsity: {:.2}%", self.median_feature_sparsity * 100.0)?;
        writeln!(f, "  Median sample sparsity:  {:.2}%", self.median_sample_sparsity * 100.0)?;
        Ok(())
    }
}

/// Profile zero fractions of a count matrix.
pub fn profile_sparsity(counts: &CountMatrix) -> SparsityProfile {
    let n_features = counts.n_features();
    let n_samples = counts.n_samples();
    let total = (n_features * n_samples).max(1) as f64;

    let feature_zero_fraction: Vec<f64> = counts
        .data()
        .outer_iterator()
        .map(|row| (n_samples - row.nnz()) as f64 / n_samples.max(1) as f64)
        .collect();
    let sample_zero_fraction: Vec<f64> = counts
        .col_nnz()
        .into_iter()
        .map(|nnz| (n_features - nnz) as f64 / n_features.max(1) as f64)
        .collect();

    SparsityProfile {
        feature_ids: counts.feature_ids().to_vec(),
        sample_ids: counts.sample_ids().to_vec(),
        sparsity: (n_features * n_samples - counts.nnz()) as f64 / total,
        median_feature_sparsity: median(&feature_zero_fraction),
        median_sample_sparsity: median(&sample_zero_fraction),
        feature_zero_fraction,
        sample_zero_fraction,
    }
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}
