//! Closure: rescaling each sample to proportions that sum to one.

use crate::data::LabeledMatrix;
use crate::error::{CodaError, Result};
use crate::zero::PseudoCountTable;
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

const STAGE: &str = "closure";

/// Tolerance on the unit row sum after closure.
pub const CLOSURE_TOLERANCE: f64 = 1e-9;

/// Proportions, samples × features; each row sums to 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProportionTable {
    /// Proportions (samples × features).
    pub matrix: LabeledMatrix,
    /// Row totals before closure.
    pub totals: Vec<f64>,
}

impl ProportionTable {
    /// Proportion for a sample and feature.
    pub fn get(&self, sample: usize, feature: usize) -> f64 {
        self.matrix.get(sample, feature)
    }

    /// Number of samples.
    pub fn n_samples(&self) -> usize {
        self.matrix.n_samples()
    }

    /// Number of features.
    pub fn n_features(&self) -> usize {
        self.matrix.n_features()
    }
}

/// Close pseudo-counts to proportions.
pub fn close(table: &PseudoCountTable) -> Result<ProportionTable> {
    close_matrix(&table.matrix)
}

/// Close any non-negative samples × features matrix to proportions.
///
/// Scale invariant: multiplying a row by a positive constant leaves its
/// output unchanged.
pub fn close_matrix(matrix: &LabeledMatrix) -> Result<ProportionTable> {
    let n_samples = matrix.n_samples();
    let n_features = matrix.n_features();
    if n_samples == 0 || n_features == 0 {
        return Err(CodaError::EmptyData(
            "Cannot close an empty matrix".to_string(),
        ));
    }

    let totals = matrix.row_sums();
    for (s, &total) in totals.iter().enumerate() {
        if !(total > 0.0 && total.is_finite()) {
            return Err(CodaError::Structural {
                stage: STAGE,
                id: matrix.sample_ids[s].clone(),
                reason: format!("has total {} and cannot be closed", total),
            });
        }
    }

    let closed_rows: Vec<Vec<f64>> = (0..n_samples)
        .into_par_iter()
        .map(|s| (0..n_features).map(|f| matrix.get(s, f) / totals[s]).collect())
        .collect();

    let mut data = DMatrix::zeros(n_samples, n_features);
    for (s, row) in closed_rows.iter().enumerate() {
        for (f, &p) in row.iter().enumerate() {
            data[(s, f)] = p;
        }
    }

    for (s, row) in data.row_iter().enumerate() {
        let sum = row.sum();
        if (sum - 1.0).abs() > CLOSURE_TOLERANCE {
            return Err(CodaError::NumericalDegeneracy {
                stage: STAGE,
                reason: format!(
                    "sample '{}' sums to {} after closure",
                    matrix.sample_ids[s], sum
                ),
            });
        }
    }

    Ok(ProportionTable {
        matrix: LabeledMatrix::new(data, matrix.sample_ids.clone(), matrix.feature_ids.clone())?,
        totals,
    })
}
