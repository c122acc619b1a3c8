//! Pairwise distances between samples.

use crate::data::LabeledMatrix;
use crate::error::{CodaError, Result};
use crate::normalize::ClrTable;
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const STAGE: &str = "distance";

/// Symmetric sample × sample distance matrix with a zero diagonal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistanceMatrix {
    /// Sample identifiers (rows and columns).
    pub sample_ids: Vec<String>,
    /// Distances.
    #[serde(skip)]
    pub data: DMatrix<f64>,
}

impl DistanceMatrix {
    /// Distance between two samples.
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[(i, j)]
    }

    /// Number of samples.
    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// Upper triangle in row order, as in a condensed distance vector.
    pub fn condensed(&self) -> Vec<f64> {
        let n = self.n_samples();
        (0..n)
            .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
            .map(|(i, j)| self.get(i, j))
            .collect()
    }

    /// Write the full matrix as TSV.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        write!(writer, "sample_id")?;
        for id in &self.sample_ids {
            write!(writer, "\t{}", id)?;
        }
        writeln!(writer)?;
        for (i, id) in self.sample_ids.iter().enumerate() {
            write!(writer, "{}", id)?;
            for j in 0..self.n_samples() {
                write!(writer, "\t{:.8}", self.get(i, j))?;
            }
            writeln!(writer)?;
        }
        Ok(())
    }
}

/// Aitchison distances: Euclidean distances between CLR rows.
pub fn aitchison_distances(clr: &ClrTable) -> Result<DistanceMatrix> {
    euclidean_distances(&clr.matrix)
}

/// Euclidean distances between the rows of a samples × features matrix.
pub fn euclidean_distances(input: &LabeledMatrix) -> Result<DistanceMatrix> {
    let n = input.n_samples();
    if n == 0 {
        return Err(CodaError::EmptyData(
            "Cannot compute distances without samples".to_string(),
        ));
    }

    let rows: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            let a = input.data.row(i);
            (0..n)
                .map(|j| if i == j { 0.0 } else { (a - input.data.row(j)).norm() })
                .collect()
        })
        .collect();

    let mut data = DMatrix::zeros(n, n);
    for (i, row) in rows.iter().enumerate() {
        for (j, &d) in row.iter().enumerate() {
            if !d.is_finite() {
                return Err(CodaError::NumericalDegeneracy {
                    stage: STAGE,
                    reason: format!(
                        "distance between '{}' and '{}' is not finite",
                        input.sample_ids[i], input.sample_ids[j]
                    ),
                });
            }
            data[(i, j)] = d;
        }
    }
    // exact symmetry regardless of summation order
    for i in 0..n {
        for j in (i + 1)..n {
            data[(j, i)] = data[(i, j)];
        }
    }

    Ok(DistanceMatrix {
        sample_ids: input.sample_ids.clone(),
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn labeled(rows: usize, cols: usize, values: &[f64]) -> LabeledMatrix {
        LabeledMatrix::new(
            DMatrix::from_row_slice(rows, cols, values),
            (0..rows).map(|i| format!("S{}", i)).collect(),
            (0..cols).map(|i| format!("f{}", i)).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_distance_properties() {
        let m = labeled(3, 2, &[0.0, 0.0, 3.0, 4.0, -1.0, 1.0]);
        let d = euclidean_distances(&m).unwrap();

        assert_relative_eq!(d.get(0, 1), 5.0, epsilon = 1e-12);
        assert_relative_eq!(d.get(0, 2), 2.0_f64.sqrt(), epsilon = 1e-12);
        for i in 0..3 {
            assert_eq!(d.get(i, i), 0.0);
            for j in 0..3 {
                assert_eq!(d.get(i, j), d.get(j, i));
                assert!(d.get(i, j) >= 0.0);
            }
        }
    }

    #[test]
    fn test_condensed_order() {
        let m = labeled(3, 1, &[0.0, 1.0, 3.0]);
        let d = euclidean_distances(&m).unwrap();
        assert_eq!(d.condensed(), vec![1.0, 3.0, 2.0]);
    }

    #[test]
    fn test_non_finite_is_degenerate() {
        let m = labeled(2, 1, &[0.0, f64::INFINITY]);
        let err = euclidean_distances(&m).unwrap_err();
        assert!(matches!(err, CodaError::NumericalDegeneracy { .. }));
    }
}
