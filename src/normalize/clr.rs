//! Centered Log-Ratio (CLR) transformation for compositional data.

use crate::data::LabeledMatrix;
use crate::error::{CodaError, Result};
use crate::filter::{FeatureOrder, FilteredProportionTable};
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

const STAGE: &str = "clr transform";

/// CLR coordinates, samples × features in canonical feature order.
///
/// Each row sums to zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClrTable {
    /// CLR values (samples × features).
    pub matrix: LabeledMatrix,
    /// Canonical feature order inherited from the abundance filter.
    pub order: FeatureOrder,
    /// Geometric mean of each sample's input values.
    pub geometric_means: Vec<f64>,
}

impl ClrTable {
    /// CLR value for a sample and feature.
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

    /// Sample identifiers.
    pub fn sample_ids(&self) -> &[String] {
        &self.matrix.sample_ids
    }

    /// Feature identifiers, in canonical order.
    pub fn feature_ids(&self) -> &[String] {
        &self.matrix.feature_ids
    }

    /// Reference to the underlying matrix.
    pub fn data(&self) -> &DMatrix<f64> {
        &self.matrix.data
    }

    /// Write CLR values, one row per sample.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.matrix.to_tsv(path)
    }
}

/// Apply the CLR transform to filtered proportions.
///
/// For sample s with parts p: CLR(p)_i = log(p_i) - mean_j(log(p_j)).
/// The canonical feature order of the input is kept as is.
pub fn norm_clr(filtered: &FilteredProportionTable) -> Result<ClrTable> {
    if !filtered.order.matches(&filtered.matrix.feature_ids) {
        return Err(CodaError::Pipeline(
            "filtered table columns do not follow its canonical order".to_string(),
        ));
    }
    let (matrix, geometric_means) = clr_matrix(&filtered.matrix)?;
    Ok(ClrTable {
        matrix,
        order: filtered.order.clone(),
        geometric_means,
    })
}

/// CLR transform of a samples × features matrix of strictly positive values.
///
/// Returns the transformed matrix and each sample's geometric mean. Any
/// non-positive or non-finite input is a domain error naming the cell.
pub fn clr_matrix(input: &LabeledMatrix) -> Result<(LabeledMatrix, Vec<f64>)> {
    let (n_samples, n_features) = input.data.shape();
    if n_samples == 0 || n_features == 0 {
        return Err(CodaError::EmptyData(
            "Cannot apply CLR to empty matrix".to_string(),
        ));
    }

    for s in 0..n_samples {
        for f in 0..n_features {
            let val = input.get(s, f);
            if !(val > 0.0 && val.is_finite()) {
                return Err(CodaError::Domain {
                    stage: STAGE,
                    sample: input.sample_ids[s].clone(),
                    feature: input.feature_ids[f].clone(),
                    value: val,
                });
            }
        }
    }

    let rows: Vec<(Vec<f64>, f64)> = (0..n_samples)
        .into_par_iter()
        .map(|s| {
            let logs: Vec<f64> = (0..n_features).map(|f| input.get(s, f).ln()).collect();
            let mean_log = logs.iter().sum::<f64>() / n_features as f64;
            let centered = logs.into_iter().map(|l| l - mean_log).collect();
            (centered, mean_log.exp())
        })
        .collect();

    let mut data = DMatrix::zeros(n_samples, n_features);
    let mut geometric_means = Vec::with_capacity(n_samples);
    for (s, (row, gmean)) in rows.into_iter().enumerate() {
        for (f, v) in row.into_iter().enumerate() {
            data[(s, f)] = v;
        }
        geometric_means.push(gmean);
    }

    let matrix = LabeledMatrix::new(data, input.sample_ids.clone(), input.feature_ids.clone())?;
    Ok((matrix, geometric_means))
}
