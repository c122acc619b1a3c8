//! Sample metadata used for group labels.
//!
//! The compositional core never reads metadata; it is joined to outputs
//! (score tables) and consumed by the optional group comparison.

use crate::error::{CodaError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// A metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Variable {
    /// Categorical variable with string levels.
    Categorical(String),
    /// Continuous numeric variable.
    Continuous(f64),
    /// Missing value.
    Missing,
}

impl Variable {
    /// Check if this is a missing value.
    pub fn is_missing(&self) -> bool {
        matches!(self, Variable::Missing)
    }

    /// Try to get as continuous f64.
    pub fn as_continuous(&self) -> Option<f64> {
        match self {
            Variable::Continuous(v) => Some(*v),
            _ => None,
        }
    }

    /// Render as a group label; continuous values are formatted, missing is `None`.
    pub fn label(&self) -> Option<String> {
        match self {
            Variable::Categorical(s) => Some(s.clone()),
            Variable::Continuous(v) => Some(v.to_string()),
            Variable::Missing => None,
        }
    }
}

/// Inferred type of a metadata column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableType {
    Categorical,
    Continuous,
}

fn is_missing_token(raw: &str) -> bool {
    raw.is_empty() || raw == "NA" || raw == "na"
}

/// Sample metadata keyed by sample identifier.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    sample_ids: Vec<String>,
    column_names: Vec<String>,
    data: HashMap<String, HashMap<String, Variable>>,
    column_types: HashMap<String, VariableType>,
}

impl Metadata {
    /// Load metadata from a TSV file.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_delimited(path, '\t')
    }

    /// Load metadata from a delimited file.
    ///
    /// The first column holds sample identifiers. Columns are continuous if
    /// every non-missing value parses as a number, otherwise categorical.
    pub fn from_delimited<P: AsRef<Path>>(path: P, delimiter: char) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file, delimiter)
    }

    /// Parse metadata from any reader.
    pub fn from_reader<R: Read>(reader: R, delimiter: char) -> Result<Self> {
        if !delimiter.is_ascii() {
            return Err(CodaError::InvalidParameter(format!(
                "Delimiter '{}' is not a single ASCII character",
                delimiter
            )));
        }
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(delimiter as u8)
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let header = rdr.headers()?.clone();
        if header.len() < 2 {
            return Err(CodaError::EmptyData(
                "Metadata must have at least one variable column".to_string(),
            ));
        }
        let column_names: Vec<String> = header.iter().skip(1).map(String::from).collect();

        let mut raw_data: Vec<(String, Vec<String>)> = Vec::new();
        for record in rdr.records() {
            let record = record?;
            let Some(sample_id) = record.get(0).filter(|s| !s.is_empty()) else {
                continue;
            };
            let values = record.iter().skip(1).map(String::from).collect();
            raw_data.push((sample_id.to_string(), values));
        }

        if raw_data.is_empty() {
            return Err(CodaError::EmptyData("No samples in metadata".to_string()));
        }

        let column_types: HashMap<String, VariableType> = column_names
            .iter()
            .enumerate()
            .map(|(col_idx, name)| {
                let all_numeric = raw_data.iter().all(|(_, values)| {
                    values
                        .get(col_idx)
                        .map(|v| is_missing_token(v) || v.parse::<f64>().is_ok())
                        .unwrap_or(true)
                });
                let var_type = if all_numeric {
                    VariableType::Continuous
                } else {
                    VariableType::Categorical
                };
                (name.clone(), var_type)
            })
            .collect();

        let mut sample_ids = Vec::with_capacity(raw_data.len());
        let mut data = HashMap::with_capacity(raw_data.len());
        for (sample_id, values) in raw_data {
            let sample_data: HashMap<String, Variable> = column_names
                .iter()
                .enumerate()
                .map(|(col_idx, name)| {
                    let var = match values.get(col_idx).map(String::as_str) {
                        None => Variable::Missing,
                        Some(raw) if is_missing_token(raw) => Variable::Missing,
                        Some(raw) => match column_types[name] {
                            VariableType::Continuous => raw
                                .parse::<f64>()
                                .map(Variable::Continuous)
                                .unwrap_or(Variable::Missing),
                            VariableType::Categorical => Variable::Categorical(raw.to_string()),
                        },
                    };
                    (name.clone(), var)
                })
                .collect();
            sample_ids.push(sample_id.clone());
            data.insert(sample_id, sample_data);
        }

        Ok(Self {
            sample_ids,
            column_names,
            data,
            column_types,
        })
    }

    /// Sample IDs in file order.
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Column names.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Number of samples.
    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// Get a variable value for a specific sample and column.
    pub fn get(&self, sample_id: &str, column: &str) -> Option<&Variable> {
        self.data.get(sample_id).and_then(|m| m.get(column))
    }

    /// Get the inferred type of a column.
    pub fn column_type(&self, column: &str) -> Option<VariableType> {
        self.column_types.get(column).copied()
    }

    /// Check if a column exists.
    pub fn has_column(&self, column: &str) -> bool {
        self.column_names.iter().any(|c| c == column)
    }

    /// Sorted distinct labels of a column.
    pub fn levels(&self, column: &str) -> Result<Vec<String>> {
        if !self.has_column(column) {
            return Err(CodaError::MissingColumn(column.to_string()));
        }
        let levels: BTreeSet<String> = self
            .sample_ids
            .iter()
            .filter_map(|sid| self.get(sid, column).and_then(Variable::label))
            .collect();
        Ok(levels.into_iter().collect())
    }

    /// Group labels for the given samples, in the given order.
    ///
    /// Every sample must be present in the metadata; a missing value yields `None`.
    pub fn labels_for(&self, column: &str, sample_ids: &[String]) -> Result<Vec<Option<String>>> {
        if !self.has_column(column) {
            return Err(CodaError::MissingColumn(column.to_string()));
        }
        sample_ids
            .iter()
            .map(|sid| {
                let row = self.data.get(sid).ok_or_else(|| {
                    CodaError::SampleMismatch(format!("Sample '{}' not found in metadata", sid))
                })?;
                Ok(row.get(column).and_then(Variable::label))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const META: &str = "sample_id\tgroup\tage\n\
                        S1\tcontrol\t25\n\
                        S2\ttreatment\tNA\n\
                        S3\tcontrol\t35\n\
                        S4\t\t28\n";

    #[test]
    fn test_load_metadata() {
        let meta = Metadata::from_reader(META.as_bytes(), '\t').unwrap();
        assert_eq!(meta.n_samples(), 4);
        assert_eq!(meta.column_names(), &["group", "age"]);
        assert_eq!(meta.column_type("group"), Some(VariableType::Categorical));
        assert_eq!(meta.column_type("age"), Some(VariableType::Continuous));
        assert_eq!(meta.get("S3", "age").unwrap().as_continuous(), Some(35.0));
    }

    #[test]
    fn test_missing_values() {
        let meta = Metadata::from_reader(META.as_bytes(), '\t').unwrap();
        assert!(meta.get("S2", "age").unwrap().is_missing());
        assert!(meta.get("S4", "group").unwrap().is_missing());
    }

    #[test]
    fn test_levels() {
        let meta = Metadata::from_reader(META.as_bytes(), '\t').unwrap();
        assert_eq!(meta.levels("group").unwrap(), vec!["control", "treatment"]);
        assert!(meta.levels("site").is_err());
    }

    #[test]
    fn test_labels_for_follows_requested_order() {
        let meta = Metadata::from_reader(META.as_bytes(), '\t').unwrap();
        let ids: Vec<String> = vec!["S4".into(), "S2".into(), "S1".into()];
        let labels = meta.labels_for("group", &ids).unwrap();
        assert_eq!(
            labels,
            vec![None, Some("treatment".to_string()), Some("control".to_string())]
        );

        let unknown: Vec<String> = vec!["S9".into()];
        assert!(meta.labels_for("group", &unknown).is_err());
    }
}
