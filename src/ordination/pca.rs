//! Principal component analysis of CLR coordinates.
//!
//! PCA is computed from the thin SVD of the column-centered matrix rather than
//! from the covariance matrix: CLR rows live on the zero-sum hyperplane, so the
//! covariance is always singular and the rank is at most `min(n - 1, p - 1)`.

use crate::data::LabeledMatrix;
use crate::error::{CodaError, Result};
use crate::normalize::ClrTable;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const STAGE: &str = "ordination";

/// Singular values below this fraction of the largest one count as zero.
pub const RANK_TOLERANCE: f64 = 1e-10;

/// Result of a principal component analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcaResult {
    /// Sample identifiers (score rows).
    pub sample_ids: Vec<String>,
    /// Feature identifiers (loading rows).
    pub feature_ids: Vec<String>,
    /// Sample coordinates, samples × components.
    #[serde(skip)]
    pub scores: DMatrix<f64>,
    /// Feature loadings (unit-norm axes), features × components.
    #[serde(skip)]
    pub loadings: DMatrix<f64>,
    /// Variance along each component, descending.
    pub explained_variance: Vec<f64>,
    /// Share of total variance per component.
    pub explained_ratio: Vec<f64>,
    /// Total variance of the input (sum of column variances).
    pub total_variance: f64,
    /// Column means removed before decomposition.
    pub column_means: Vec<f64>,
    /// Number of components with non-negligible variance.
    pub rank: usize,
}

impl PcaResult {
    /// Number of components reported, `min(samples, features)`.
    pub fn n_components(&self) -> usize {
        self.explained_variance.len()
    }

    /// Scores of one component for every sample.
    pub fn component_scores(&self, component: usize) -> Vec<f64> {
        self.scores.column(component).iter().copied().collect()
    }

    /// Cumulative explained-variance ratio.
    pub fn cumulative_ratio(&self) -> Vec<f64> {
        self.explained_ratio
            .iter()
            .scan(0.0, |acc, r| {
                *acc += r;
                Some(*acc)
            })
            .collect()
    }

    /// Write the first `n_components` scores, optionally with a group column.
    pub fn scores_to_tsv<P: AsRef<Path>>(
        &self,
        path: P,
        n_components: usize,
        groups: Option<&[Option<String>]>,
    ) -> Result<()> {
        if let Some(labels) = groups {
            if labels.len() != self.sample_ids.len() {
                return Err(CodaError::DimensionMismatch {
                    expected: self.sample_ids.len(),
                    actual: labels.len(),
                });
            }
        }
        let k = n_components.min(self.n_components());
        let mut writer = BufWriter::new(File::create(path)?);

        write!(writer, "sample_id")?;
        for c in 0..k {
            write!(writer, "\tPC{}", c + 1)?;
        }
        if groups.is_some() {
            write!(writer, "\tgroup")?;
        }
        writeln!(writer)?;

        for (s, id) in self.sample_ids.iter().enumerate() {
            write!(writer, "{}", id)?;
            for c in 0..k {
                write!(writer, "\t{:.8}", self.scores[(s, c)])?;
            }
            if let Some(labels) = groups {
                write!(writer, "\t{}", labels[s].as_deref().unwrap_or("NA"))?;
            }
            writeln!(writer)?;
        }
        Ok(())
    }

    /// Write the first `n_components` loadings.
    pub fn loadings_to_tsv<P: AsRef<Path>>(&self, path: P, n_components: usize) -> Result<()> {
        let k = n_components.min(self.n_components());
        let mut writer = BufWriter::new(File::create(path)?);
        write!(writer, "feature_id")?;
        for c in 0..k {
            write!(writer, "\tPC{}", c + 1)?;
        }
        writeln!(writer)?;
        for (f, id) in self.feature_ids.iter().enumerate() {
            write!(writer, "{}", id)?;
            for c in 0..k {
                write!(writer, "\t{:.8}", self.loadings[(f, c)])?;
            }
            writeln!(writer)?;
        }
        Ok(())
    }

    /// Write variance per component (scree data).
    pub fn scree_to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "component\tvariance\tratio\tcumulative")?;
        for (c, ((var, ratio), cum)) in self
            .explained_variance
            .iter()
            .zip(&self.explained_ratio)
            .zip(self.cumulative_ratio())
            .enumerate()
        {
            writeln!(writer, "PC{}\t{:.8e}\t{:.6}\t{:.6}", c + 1, var, ratio, cum)?;
        }
        Ok(())
    }
}

/// PCA of a CLR table.
pub fn pca(clr: &ClrTable) -> Result<PcaResult> {
    pca_matrix(&clr.matrix)
}

/// PCA of any samples × features matrix.
///
/// Variances use the `n - 1` denominator. Each axis is oriented so that its
/// largest-magnitude loading is positive.
pub fn pca_matrix(input: &LabeledMatrix) -> Result<PcaResult> {
    let (n, p) = input.data.shape();
    if n < 2 {
        return Err(CodaError::NumericalDegeneracy {
            stage: STAGE,
            reason: format!("PCA needs at least 2 samples, got {}", n),
        });
    }
    if p == 0 {
        return Err(CodaError::EmptyData("PCA on a matrix without features".to_string()));
    }
    if input.data.iter().any(|v| !v.is_finite()) {
        return Err(CodaError::NumericalDegeneracy {
            stage: STAGE,
            reason: "input contains non-finite values".to_string(),
        });
    }

    let column_means: Vec<f64> = input.data.column_iter().map(|c| c.mean()).collect();
    let means = DVector::from_vec(column_means.clone());
    let mut centered = input.data.clone();
    for mut row in centered.row_iter_mut() {
        row -= means.transpose();
    }

    let denom = (n - 1) as f64;
    let total_variance = centered.norm_squared() / denom;

    let svd = centered.svd(true, true);
    let u = svd.u.ok_or_else(|| CodaError::NumericalDegeneracy {
        stage: STAGE,
        reason: "SVD did not produce left singular vectors".to_string(),
    })?;
    let v_t = svd.v_t.ok_or_else(|| CodaError::NumericalDegeneracy {
        stage: STAGE,
        reason: "SVD did not produce right singular vectors".to_string(),
    })?;
    let singular = svd.singular_values;

    let mut order: Vec<usize> = (0..singular.len()).collect();
    order.sort_by(|&a, &b| singular[b].total_cmp(&singular[a]).then(a.cmp(&b)));

    let k = order.len();
    let mut scores = DMatrix::zeros(n, k);
    let mut loadings = DMatrix::zeros(p, k);
    let mut explained_variance = Vec::with_capacity(k);
    for (c, &idx) in order.iter().enumerate() {
        let s = singular[idx];
        let axis = v_t.row(idx).transpose();
        let sign = orientation(axis.as_slice());
        for f in 0..p {
            loadings[(f, c)] = sign * axis[f];
        }
        for i in 0..n {
            scores[(i, c)] = sign * u[(i, idx)] * s;
        }
        explained_variance.push(s * s / denom);
    }

    let s_max = order.first().map(|&i| singular[i]).unwrap_or(0.0);
    let tol = s_max * RANK_TOLERANCE;
    let rank = singular.iter().filter(|&&s| s > tol).count();
    let expected = (n - 1).min(p.saturating_sub(1));
    if rank < expected {
        log::warn!(
            "CLR matrix has rank {}, below the expected {} for {} samples x {} features",
            rank,
            expected,
            n,
            p
        );
    }

    let explained_ratio = explained_variance
        .iter()
        .map(|v| if total_variance > 0.0 { v / total_variance } else { 0.0 })
        .collect();

    Ok(PcaResult {
        sample_ids: input.sample_ids.clone(),
        feature_ids: input.feature_ids.clone(),
        scores,
        loadings,
        explained_variance,
        explained_ratio,
        total_variance,
        column_means,
        rank,
    })
}

/// +1 or -1 so that the largest-magnitude entry becomes positive.
fn orientation(axis: &[f64]) -> f64 {
    let pivot = axis
        .iter()
        .copied()
        .fold(0.0_f64, |best, v| if v.abs() > best.abs() { v } else { best });
    if pivot < 0.0 {
        -1.0
    } else {
        1.0
    }
}
