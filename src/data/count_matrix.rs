//! Count matrix with sparse storage for microbiome abundance data.

use super::raw_table::{ensure_unique, MissingValueReport, RawTable, TableFormat};
use crate::error::{CodaError, Result};
use nalgebra::DMatrix;
use rayon::prelude::*;
use sprs::{CsMat, TriMat};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// A sparse count matrix storing feature abundances across samples.
///
/// Rows represent features (taxa/OTUs), columns represent samples, matching
/// the on-disk layout. Uses CSR (Compressed Sparse Row) format.
///
/// All downstream stages work sample-major; [`CountMatrix::to_sample_major`]
/// is the single place where the transposition happens.
#[derive(Debug, Clone)]
pub struct CountMatrix {
    /// Sparse matrix in CSR format (features × samples)
    data: CsMat<u64>,
    /// Feature identifiers (row names)
    feature_ids: Vec<String>,
    /// Sample identifiers (column names)
    sample_ids: Vec<String>,
}

impl CountMatrix {
    /// Create a new CountMatrix from a sparse matrix and identifiers.
    pub fn new(
        data: CsMat<u64>,
        feature_ids: Vec<String>,
        sample_ids: Vec<String>,
    ) -> Result<Self> {
        let (nrows, ncols) = data.shape();
        if nrows != feature_ids.len() {
            return Err(CodaError::DimensionMismatch {
                expected: nrows,
                actual: feature_ids.len(),
            });
        }
        if ncols != sample_ids.len() {
            return Err(CodaError::DimensionMismatch {
                expected: ncols,
                actual: sample_ids.len(),
            });
        }
        ensure_unique(&feature_ids, "feature")?;
        ensure_unique(&sample_ids, "sample")?;
        Ok(Self {
            data,
            feature_ids,
            sample_ids,
        })
    }

    /// Build from dense per-sample rows (samples × features).
    pub fn from_sample_rows(
        rows: &[Vec<u64>],
        feature_ids: Vec<String>,
        sample_ids: Vec<String>,
    ) -> Result<Self> {
        if rows.len() != sample_ids.len() {
            return Err(CodaError::DimensionMismatch {
                expected: sample_ids.len(),
                actual: rows.len(),
            });
        }
        let mut tri_mat = TriMat::new((feature_ids.len(), sample_ids.len()));
        for (sample, row) in rows.iter().enumerate() {
            if row.len() != feature_ids.len() {
                return Err(CodaError::DimensionMismatch {
                    expected: feature_ids.len(),
                    actual: row.len(),
                });
            }
            for (feature, &val) in row.iter().enumerate() {
                if val > 0 {
                    tri_mat.add_triplet(feature, sample, val);
                }
            }
        }
        Self::new(tri_mat.to_csr(), feature_ids, sample_ids)
    }

    /// Load a count matrix from a delimited file, coercing missing entries to zero.
    pub fn from_delimited<P: AsRef<Path>>(
        path: P,
        format: &TableFormat,
    ) -> Result<(Self, MissingValueReport)> {
        RawTable::from_delimited(path, format)?.fill_missing()
    }

    /// Load a features × samples TSV file.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let (counts, _) = Self::from_delimited(path, &TableFormat::tsv())?;
        Ok(counts)
    }

    /// Write the count matrix to a TSV file (features as rows).
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        write!(writer, "feature_id")?;
        for sample_id in &self.sample_ids {
            write!(writer, "\t{}", sample_id)?;
        }
        writeln!(writer)?;

        for (row_idx, feature_id) in self.feature_ids.iter().enumerate() {
            write!(writer, "{}", feature_id)?;
            for col_idx in 0..self.n_samples() {
                write!(writer, "\t{}", self.get(row_idx, col_idx))?;
            }
            writeln!(writer)?;
        }

        Ok(())
    }

    /// Get the value at (feature, sample), returning 0 for missing entries.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> u64 {
        self.data.get(row, col).copied().unwrap_or(0)
    }

    /// Number of features (rows).
    #[inline]
    pub fn n_features(&self) -> usize {
        self.data.rows()
    }

    /// Number of samples (columns).
    #[inline]
    pub fn n_samples(&self) -> usize {
        self.data.cols()
    }

    /// Total number of non-zero entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.data.nnz()
    }

    /// Feature identifiers.
    #[inline]
    pub fn feature_ids(&self) -> &[String] {
        &self.feature_ids
    }

    /// Sample identifiers.
    #[inline]
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Get the underlying sparse matrix.
    #[inline]
    pub fn data(&self) -> &CsMat<u64> {
        &self.data
    }

    /// Get a dense vector for a specific column (sample).
    pub fn col_dense(&self, col: usize) -> Vec<u64> {
        (0..self.n_features())
            .map(|row| self.get(row, col))
            .collect()
    }

    /// Compute row sums (total counts per feature).
    pub fn row_sums(&self) -> Vec<u64> {
        (0..self.n_features())
            .into_par_iter()
            .map(|row| {
                self.data
                    .outer_view(row)
                    .map(|v| v.iter().map(|(_, &val)| val).sum())
                    .unwrap_or(0)
            })
            .collect()
    }

    /// Compute column sums (library sizes per sample).
    pub fn col_sums(&self) -> Vec<u64> {
        let mut sums = vec![0u64; self.n_samples()];
        for row_vec in self.data.outer_iterator() {
            for (col, &val) in row_vec.iter() {
                sums[col] += val;
            }
        }
        sums
    }

    /// Number of non-zero entries per sample.
    pub fn col_nnz(&self) -> Vec<usize> {
        let mut nnz = vec![0usize; self.n_samples()];
        for row_vec in self.data.outer_iterator() {
            for (col, _) in row_vec.iter() {
                nnz[col] += 1;
            }
        }
        nnz
    }

    /// Subset (or reorder) features by index.
    pub fn subset_features(&self, indices: &[usize]) -> Result<Self> {
        let mut tri_mat = TriMat::new((indices.len(), self.n_samples()));
        let mut new_feature_ids = Vec::with_capacity(indices.len());

        for (new_row, &old_row) in indices.iter().enumerate() {
            if old_row >= self.n_features() {
                return Err(CodaError::InvalidParameter(format!(
                    "Feature index {} out of bounds",
                    old_row
                )));
            }
            new_feature_ids.push(self.feature_ids[old_row].clone());

            if let Some(row_vec) = self.data.outer_view(old_row) {
                for (col, &val) in row_vec.iter() {
                    tri_mat.add_triplet(new_row, col, val);
                }
            }
        }

        Self::new(tri_mat.to_csr(), new_feature_ids, self.sample_ids.clone())
    }

    /// Subset the matrix to include only specified samples (by index).
    pub fn subset_samples(&self, indices: &[usize]) -> Result<Self> {
        let col_map: HashMap<usize, usize> = indices
            .iter()
            .enumerate()
            .map(|(new_idx, &old_idx)| (old_idx, new_idx))
            .collect();

        let mut new_sample_ids = Vec::with_capacity(indices.len());
        for &old_col in indices {
            if old_col >= self.n_samples() {
                return Err(CodaError::InvalidParameter(format!(
                    "Sample index {} out of bounds",
                    old_col
                )));
            }
            new_sample_ids.push(self.sample_ids[old_col].clone());
        }

        let mut tri_mat = TriMat::new((self.n_features(), indices.len()));
        for (row, row_vec) in self.data.outer_iterator().enumerate() {
            for (old_col, &val) in row_vec.iter() {
                if let Some(&new_col) = col_map.get(&old_col) {
                    tri_mat.add_triplet(row, new_col, val);
                }
            }
        }

        Self::new(tri_mat.to_csr(), self.feature_ids.clone(), new_sample_ids)
    }

    /// Dense samples × features copy of the counts.
    ///
    /// Pre-shape: features × samples (sparse). Post-shape: samples × features.
    pub fn to_sample_major(&self) -> DMatrix<f64> {
        let mut dense = DMatrix::zeros(self.n_samples(), self.n_features());
        for (feature, row_vec) in self.data.outer_iterator().enumerate() {
            for (sample, &val) in row_vec.iter() {
                dense[(sample, feature)] = val as f64;
            }
        }
        dense
    }
}
