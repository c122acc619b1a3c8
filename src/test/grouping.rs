//! Two-level sample grouping taken from metadata.

use crate::data::Metadata;
use crate::error::{CodaError, Result};
use serde::{Deserialize, Serialize};

/// Side of the comparison a sample falls on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupSide {
    Reference,
    Comparison,
}

/// Assignment of samples to a reference and a comparison level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grouping {
    /// Metadata column the grouping comes from.
    pub column: String,
    /// Reference level.
    pub reference: String,
    /// Comparison level.
    pub comparison: String,
    /// Side per sample, aligned with the sample order it was built for.
    /// Samples with no label are `None` and left out of tests.
    pub sides: Vec<Option<GroupSide>>,
}

impl Grouping {
    /// Build a grouping for `sample_ids` from a categorical metadata column.
    ///
    /// The column must have exactly two levels among these samples. Without an
    /// explicit `reference`, the alphabetically first level is the reference.
    pub fn from_metadata(
        metadata: &Metadata,
        column: &str,
        sample_ids: &[String],
        reference: Option<&str>,
    ) -> Result<Self> {
        let labels = metadata.labels_for(column, sample_ids)?;
        let mut levels: Vec<&str> = labels.iter().flatten().map(String::as_str).collect();
        levels.sort_unstable();
        levels.dedup();

        if levels.len() != 2 {
            return Err(CodaError::InvalidParameter(format!(
                "column '{}' must have exactly two levels, found {:?}",
                column, levels
            )));
        }

        let reference = match reference {
            Some(r) if levels.contains(&r) => r.to_string(),
            Some(r) => {
                return Err(CodaError::InvalidParameter(format!(
                    "reference level '{}' not found in column '{}' (levels {:?})",
                    r, column, levels
                )))
            }
            None => levels[0].to_string(),
        };
        let comparison = levels
            .iter()
            .find(|&&l| l != reference)
            .map(|l| l.to_string())
            .ok_or_else(|| CodaError::InvalidParameter("no comparison level".to_string()))?;

        let sides: Vec<Option<GroupSide>> = labels
            .iter()
            .map(|label| {
                label.as_deref().map(|l| {
                    if l == reference {
                        GroupSide::Reference
                    } else {
                        GroupSide::Comparison
                    }
                })
            })
            .collect();

        let unlabeled = sides.iter().filter(|s| s.is_none()).count();
        if unlabeled > 0 {
            log::warn!(
                "{} sample(s) have no '{}' label and are left out of the group test",
                unlabeled,
                column
            );
        }

        Ok(Self {
            column: column.to_string(),
            reference,
            comparison,
            sides,
        })
    }

    /// Indices of samples on one side.
    pub fn indices(&self, side: GroupSide) -> Vec<usize> {
        self.sides
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == Some(side))
            .map(|(i, _)| i)
            .collect()
    }

    /// Group sizes as (reference, comparison).
    pub fn sizes(&self) -> (usize, usize) {
        (
            self.indices(GroupSide::Reference).len(),
            self.indices(GroupSide::Comparison).len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const META: &str = "sample_id\tgroup\n\
                        S1\thealthy\n\
                        S2\tdisease\n\
                        S3\thealthy\n\
                        S4\tNA\n\
                        S5\tdisease\n";

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_default_reference_is_first_level() {
        let meta = Metadata::from_reader(META.as_bytes(), '\t').unwrap();
        let g = Grouping::from_metadata(&meta, "group", &ids(&["S1", "S2", "S3", "S4", "S5"]), None)
            .unwrap();
        assert_eq!(g.reference, "disease");
        assert_eq!(g.comparison, "healthy");
        assert_eq!(g.indices(GroupSide::Reference), vec![1, 4]);
        assert_eq!(g.indices(GroupSide::Comparison), vec![0, 2]);
        assert_eq!(g.sides[3], None);
    }

    #[test]
    fn test_explicit_reference() {
        let meta = Metadata::from_reader(META.as_bytes(), '\t').unwrap();
        let g = Grouping::from_metadata(&meta, "group", &ids(&["S5", "S1"]), Some("healthy"))
            .unwrap();
        assert_eq!(g.sizes(), (1, 1));
        assert_eq!(g.sides, vec![Some(GroupSide::Comparison), Some(GroupSide::Reference)]);
    }

    #[test]
    fn test_rejects_unknown_reference_and_single_level() {
        let meta = Metadata::from_reader(META.as_bytes(), '\t').unwrap();
        let all = ids(&["S1", "S2", "S3"]);
        assert!(Grouping::from_metadata(&meta, "group", &all, Some("sick")).is_err());
        assert!(Grouping::from_metadata(&meta, "group", &ids(&["S1", "S3"]), None).is_err());
        assert!(Grouping::from_metadata(&meta, "missing", &all, None).is_err());
    }
}
