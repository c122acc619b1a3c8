//! Delimited count tables as read from disk, before missing-value handling.

use super::CountMatrix;
use crate::error::{CodaError, Result};
use serde::{Deserialize, Serialize};
use sprs::TriMat;
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

const STAGE: &str = "table input";

/// Tokens parsed as a missing value.
const MISSING_TOKENS: [&str; 5] = ["", "NA", "na", "NaN", "nan"];

/// Which axis of the file holds the features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    /// One row per feature, one column per sample (the usual OTU table layout).
    #[default]
    FeaturesAsRows,
    /// One row per sample, one column per feature.
    SamplesAsRows,
}

/// Layout of a delimited count table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableFormat {
    /// Field delimiter (single ASCII character).
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Which axis holds the features.
    #[serde(default)]
    pub orientation: Orientation,
}

fn default_delimiter() -> char {
    '\t'
}

impl Default for TableFormat {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            orientation: Orientation::FeaturesAsRows,
        }
    }
}

impl TableFormat {
    /// Tab-separated, features as rows.
    pub fn tsv() -> Self {
        Self::default()
    }

    /// Comma-separated, features as rows.
    pub fn csv() -> Self {
        Self {
            delimiter: ',',
            ..Self::default()
        }
    }

    fn delimiter_byte(&self) -> Result<u8> {
        if self.delimiter.is_ascii() {
            Ok(self.delimiter as u8)
        } else {
            Err(CodaError::InvalidParameter(format!(
                "Delimiter '{}' is not a single ASCII character",
                self.delimiter
            )))
        }
    }
}

/// Diagnostic record of the NA → 0 normalization step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingValueReport {
    /// Total number of entries coerced from missing to zero.
    pub n_coerced: usize,
    /// Sample identifiers, aligned with `per_sample`.
    pub sample_ids: Vec<String>,
    /// Number of coerced entries per sample.
    pub per_sample: Vec<usize>,
}

impl MissingValueReport {
    /// Samples that had at least one missing entry, with their counts.
    pub fn affected_samples(&self) -> Vec<(&str, usize)> {
        self.sample_ids
            .iter()
            .zip(&self.per_sample)
            .filter(|(_, &n)| n > 0)
            .map(|(id, &n)| (id.as_str(), n))
            .collect()
    }
}

/// A count table exactly as parsed, with missing entries still explicit.
///
/// Stored in features × samples layout regardless of the file orientation.
#[derive(Debug, Clone)]
pub struct RawTable {
    feature_ids: Vec<String>,
    sample_ids: Vec<String>,
    /// Row-major values, `feature * n_samples + sample`.
    values: Vec<Option<u64>>,
}

impl RawTable {
    /// Build a raw table from features × samples values.
    pub fn new(
        values: Vec<Vec<Option<u64>>>,
        feature_ids: Vec<String>,
        sample_ids: Vec<String>,
    ) -> Result<Self> {
        if values.len() != feature_ids.len() {
            return Err(CodaError::DimensionMismatch {
                expected: feature_ids.len(),
                actual: values.len(),
            });
        }
        ensure_unique(&feature_ids, "feature")?;
        ensure_unique(&sample_ids, "sample")?;
        let n_samples = sample_ids.len();
        let mut flat = Vec::with_capacity(values.len() * n_samples);
        for row in values {
            if row.len() != n_samples {
                return Err(CodaError::DimensionMismatch {
                    expected: n_samples,
                    actual: row.len(),
                });
            }
            flat.extend(row);
        }
        Ok(Self {
            feature_ids,
            sample_ids,
            values: flat,
        })
    }

    /// Load a raw table from a delimited file.
    pub fn from_delimited<P: AsRef<Path>>(path: P, format: &TableFormat) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file, format)
    }

    /// Parse a raw table from any reader.
    ///
    /// Expected layout: a header row whose first cell names the identifier column,
    /// then one identifier per line followed by the counts.
    pub fn from_reader<R: Read>(reader: R, format: &TableFormat) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(format.delimiter_byte()?)
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let header = rdr.headers()?.clone();
        if header.len() < 2 {
            return Err(CodaError::EmptyData(
                "Table must have at least one data column".to_string(),
            ));
        }
        let column_ids: Vec<String> = header.iter().skip(1).map(String::from).collect();

        let mut row_ids = Vec::new();
        let mut rows: Vec<Vec<Option<u64>>> = Vec::new();
        for (row_idx, record) in rdr.records().enumerate() {
            let record = record?;
            let Some(id) = record.get(0) else {
                continue;
            };
            if record.len() != header.len() {
                return Err(CodaError::DimensionMismatch {
                    expected: header.len(),
                    actual: record.len(),
                });
            }
            let mut row = Vec::with_capacity(column_ids.len());
            for (col_idx, field) in record.iter().skip(1).enumerate() {
                row.push(parse_count(field, row_idx, col_idx)?);
            }
            row_ids.push(id.to_string());
            rows.push(row);
        }

        if rows.is_empty() {
            return Err(CodaError::EmptyData("No data rows in table".to_string()));
        }

        match format.orientation {
            Orientation::FeaturesAsRows => Self::new(rows, row_ids, column_ids),
            Orientation::SamplesAsRows => {
                // samples × features on disk → features × samples
                let transposed: Vec<Vec<Option<u64>>> = (0..column_ids.len())
                    .map(|f| rows.iter().map(|row| row[f]).collect())
                    .collect();
                Self::new(transposed, column_ids, row_ids)
            }
        }
    }

    /// Number of features.
    pub fn n_features(&self) -> usize {
        self.feature_ids.len()
    }

    /// Number of samples.
    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// Feature identifiers.
    pub fn feature_ids(&self) -> &[String] {
        &self.feature_ids
    }

    /// Sample identifiers.
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Raw value at (feature, sample); `None` for a missing entry.
    pub fn get(&self, feature: usize, sample: usize) -> Option<u64> {
        self.values[feature * self.n_samples() + sample]
    }

    /// Number of missing entries.
    pub fn n_missing(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }

    /// Replace every missing entry with zero.
    ///
    /// Returns the sparse count matrix together with a report of how many
    /// entries were coerced, overall and per sample.
    pub fn fill_missing(&self) -> Result<(CountMatrix, MissingValueReport)> {
        let n_samples = self.n_samples();
        let mut per_sample = vec![0usize; n_samples];
        let mut tri_mat = TriMat::new((self.n_features(), n_samples));

        for (idx, value) in self.values.iter().enumerate() {
            let (row, col) = (idx / n_samples, idx % n_samples);
            match value {
                Some(0) => {}
                Some(v) => tri_mat.add_triplet(row, col, *v),
                None => per_sample[col] += 1,
            }
        }

        let report = MissingValueReport {
            n_coerced: per_sample.iter().sum(),
            sample_ids: self.sample_ids.clone(),
            per_sample,
        };
        if report.n_coerced > 0 {
            log::info!(
                "Coerced {} missing entries to zero across {} samples",
                report.n_coerced,
                report.affected_samples().len()
            );
        }

        let counts = CountMatrix::new(
            tri_mat.to_csr(),
            self.feature_ids.clone(),
            self.sample_ids.clone(),
        )?;
        Ok((counts, report))
    }
}

/// Identifiers are looked up by name downstream, so repeats would alias columns.
pub(super) fn ensure_unique(ids: &[String], kind: &str) -> Result<()> {
    let mut seen = HashSet::with_capacity(ids.len());
    for id in ids {
        if !seen.insert(id.as_str()) {
            return Err(CodaError::Structural {
                stage: STAGE,
                id: id.clone(),
                reason: format!("appears more than once as a {} identifier", kind),
            });
        }
    }
    Ok(())
}

fn parse_count(field: &str, row: usize, col: usize) -> Result<Option<u64>> {
    if MISSING_TOKENS.contains(&field) {
        return Ok(None);
    }
    if let Ok(v) = field.parse::<u64>() {
        return Ok(Some(v));
    }
    // Accept integral floats such as "12.0" written by some exporters
    match field.parse::<f64>() {
        Ok(v) if v >= 0.0 && v.fract() == 0.0 && v.is_finite() => Ok(Some(v as u64)),
        _ => Err(CodaError::InvalidCount {
            value: field.to_string(),
            row,
            col,
        }),
    }
}
