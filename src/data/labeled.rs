//! Dense sample-major matrices with row and column labels.

use crate::error::{CodaError, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// A dense samples × features matrix with identifiers.
///
/// Every stage after zero replacement produces one of these; row `s` is
/// always sample `sample_ids[s]` and column `f` is always feature
/// `feature_ids[f]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabeledMatrix {
    /// Values (samples × features).
    #[serde(skip)]
    pub data: DMatrix<f64>,
    /// Sample identifiers (row names).
    pub sample_ids: Vec<String>,
    /// Feature identifiers (column names).
    pub feature_ids: Vec<String>,
}

impl LabeledMatrix {
    /// Create a labeled matrix, checking that the labels fit the shape.
    pub fn new(data: DMatrix<f64>, sample_ids: Vec<String>, feature_ids: Vec<String>) -> Result<Self> {
        if data.nrows() != sample_ids.len() {
            return Err(CodaError::DimensionMismatch {
                expected: data.nrows(),
                actual: sample_ids.len(),
            });
        }
        if data.ncols() != feature_ids.len() {
            return Err(CodaError::DimensionMismatch {
                expected: data.ncols(),
                actual: feature_ids.len(),
            });
        }
        Ok(Self {
            data,
            sample_ids,
            feature_ids,
        })
    }

    /// Value for a sample and feature.
    #[inline]
    pub fn get(&self, sample: usize, feature: usize) -> f64 {
        self.data[(sample, feature)]
    }

    /// Number of samples (rows).
    #[inline]
    pub fn n_samples(&self) -> usize {
        self.data.nrows()
    }

    /// Number of features (columns).
    #[inline]
    pub fn n_features(&self) -> usize {
        self.data.ncols()
    }

    /// Values of one sample across all features.
    pub fn row(&self, sample: usize) -> Vec<f64> {
        self.data.row(sample).iter().copied().collect()
    }

    /// Values of one feature across all samples.
    pub fn column(&self, feature: usize) -> Vec<f64> {
        self.data.column(feature).iter().copied().collect()
    }

    /// Per-sample totals.
    pub fn row_sums(&self) -> Vec<f64> {
        self.data.row_iter().map(|r| r.sum()).collect()
    }

    /// Per-feature totals.
    pub fn column_sums(&self) -> Vec<f64> {
        self.data.column_iter().map(|c| c.sum()).collect()
    }

    /// Position of a feature by identifier.
    pub fn feature_index(&self, feature_id: &str) -> Option<usize> {
        self.feature_ids.iter().position(|f| f == feature_id)
    }

    /// Position of a sample by identifier.
    pub fn sample_index(&self, sample_id: &str) -> Option<usize> {
        self.sample_ids.iter().position(|s| s == sample_id)
    }

    /// Value looked up by identifiers.
    pub fn get_by_id(&self, sample_id: &str, feature_id: &str) -> Option<f64> {
        Some(self.get(self.sample_index(sample_id)?, self.feature_index(feature_id)?))
    }

    /// Keep (and reorder) features by index.
    pub fn select_features(&self, indices: &[usize]) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.n_features()) {
            return Err(CodaError::InvalidParameter(format!(
                "Feature index {} out of bounds",
                bad
            )));
        }
        let data = self.data.select_columns(indices);
        let feature_ids = indices.iter().map(|&i| self.feature_ids[i].clone()).collect();
        Self::new(data, self.sample_ids.clone(), feature_ids)
    }

    /// Write as TSV with one row per sample.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        write!(writer, "sample_id")?;
        for feature_id in &self.feature_ids {
            write!(writer, "\t{}", feature_id)?;
        }
        writeln!(writer)?;

        for (s, sample_id) in self.sample_ids.iter().enumerate() {
            write!(writer, "{}", sample_id)?;
            for f in 0..self.n_features() {
                write!(writer, "\t{:.10e}", self.get(s, f))?;
            }
            writeln!(writer)?;
        }
        Ok(())
    }
}
