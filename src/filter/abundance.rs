//! Abundance filtering on proportions and the canonical feature order.

use crate::data::LabeledMatrix;
use crate::error::{CodaError, Result};
use crate::normalize::ProportionTable;
use crate::zero::PseudoCountTable;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Default minimum proportion a feature must reach in at least one sample (0.01%).
pub const DEFAULT_MIN_PROPORTION: f64 = 1e-4;

/// The canonical feature order: descending total pseudo-count across samples.
///
/// Computed once by [`filter_max_abundance`] and carried by every later table,
/// so CLR columns, legends and bar plots all agree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureOrder {
    /// Feature identifiers in canonical order.
    pub feature_ids: Vec<String>,
    /// Total pseudo-count per feature, aligned with `feature_ids`.
    pub totals: Vec<f64>,
}

impl FeatureOrder {
    /// Order features by descending total; ties by ascending identifier.
    fn from_totals(mut entries: Vec<(String, f64)>) -> Self {
        entries.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let (feature_ids, totals) = entries.into_iter().unzip();
        Self {
            feature_ids,
            totals,
        }
    }

    /// Number of features.
    pub fn len(&self) -> usize {
        self.feature_ids.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.feature_ids.is_empty()
    }

    /// Rank of a feature in the order.
    pub fn position(&self, feature_id: &str) -> Option<usize> {
        self.feature_ids.iter().position(|f| f == feature_id)
    }

    /// Whether `ids` lists exactly this order.
    pub fn matches(&self, ids: &[String]) -> bool {
        self.feature_ids.as_slice() == ids
    }
}

/// Proportions restricted to abundant features, columns in canonical order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilteredProportionTable {
    /// Proportions of the retained features (samples × features, canonical order).
    ///
    /// Rows no longer sum to one once features are dropped.
    pub matrix: LabeledMatrix,
    /// Canonical feature order; equal to `matrix.feature_ids`.
    pub order: FeatureOrder,
    /// Threshold applied.
    pub min_proportion: f64,
    /// Features removed, in input order.
    pub dropped_features: Vec<String>,
}

impl FilteredProportionTable {
    /// Number of retained features.
    pub fn n_features(&self) -> usize {
        self.matrix.n_features()
    }

    /// Number of samples.
    pub fn n_samples(&self) -> usize {
        self.matrix.n_samples()
    }

    /// Summary statistics of the filter.
    pub fn summary(&self) -> AbundanceFilterResult {
        let n_after = self.n_features();
        let n_before = n_after + self.dropped_features.len();
        AbundanceFilterResult {
            n_before,
            n_after,
            n_removed: self.dropped_features.len(),
            retention_rate: n_after as f64 / n_before as f64,
        }
    }

    /// Write the filtered proportions, one row per sample.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.matrix.to_tsv(path)
    }

    /// Write the canonical order with totals.
    pub fn order_to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "rank\tfeature_id\ttotal_pseudocount")?;
        for (rank, (id, total)) in self.order.feature_ids.iter().zip(&self.order.totals).enumerate() {
            writeln!(writer, "{}\t{}\t{:.6}", rank + 1, id, total)?;
        }
        Ok(())
    }
}

/// Statistics about an abundance filter run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbundanceFilterResult {
    /// Number of features before filtering.
    pub n_before: usize,
    /// Number of features after filtering.
    pub n_after: usize,
    /// Number of features removed.
    pub n_removed: usize,
    /// Proportion of features retained.
    pub retention_rate: f64,
}

impl std::fmt::Display for AbundanceFilterResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Abundance Filter Result")?;
        writeln!(f, "  Features before:  {}", self.n_before)?;
        writeln!(f, "  Features after:   {}", self.n_after)?;
        writeln!(f, "  Features removed: {}", self.n_removed)?;
        writeln!(f, "  Feature retention: {:.1}%", self.retention_rate * 100.0)?;
        Ok(())
    }
}

/// Keep features whose maximum proportion across samples is at least `min_proportion`.
///
/// Retained features are reordered by descending total pseudo-count; this is
/// the canonical feature order used from here on.
pub fn filter_max_abundance(
    proportions: &ProportionTable,
    pseudo_counts: &PseudoCountTable,
    min_proportion: f64,
) -> Result<FilteredProportionTable> {
    if !(0.0..=1.0).contains(&min_proportion) {
        return Err(CodaError::InvalidParameter(
            "min_proportion must be between 0 and 1".to_string(),
        ));
    }
    if proportions.matrix.feature_ids != pseudo_counts.matrix.feature_ids
        || proportions.matrix.sample_ids != pseudo_counts.matrix.sample_ids
    {
        return Err(CodaError::SampleMismatch(
            "proportions and pseudo-counts describe different tables".to_string(),
        ));
    }

    let props = &proportions.matrix;
    let totals = pseudo_counts.matrix.column_sums();

    let mut kept = Vec::new();
    let mut dropped_features = Vec::new();
    for (f, column) in props.data.column_iter().enumerate() {
        if column.max() >= min_proportion {
            kept.push((props.feature_ids[f].clone(), totals[f]));
        } else {
            dropped_features.push(props.feature_ids[f].clone());
        }
    }

    if kept.is_empty() {
        return Err(CodaError::EmptyData(format!(
            "No feature reaches a proportion of {:.2e} in any sample",
            min_proportion
        )));
    }

    let order = FeatureOrder::from_totals(kept);
    let indices: Vec<usize> = order
        .feature_ids
        .iter()
        .filter_map(|id| props.feature_index(id))
        .collect();
    let matrix = props.select_features(&indices)?;

    log::info!(
        "Abundance filter kept {} of {} features (max proportion >= {:.2e})",
        order.len(),
        props.n_features(),
        min_proportion
    );

    Ok(FilteredProportionTable {
        matrix,
        order,
        min_proportion,
        dropped_features,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CountMatrix;
    use crate::normalize::close;
    use crate::zero::{replace_zeros_czm, CzmConfig};

    fn create_tables(rows: &[Vec<u64>], ids: &[&str]) -> (PseudoCountTable, ProportionTable) {
        let counts = CountMatrix::from_sample_rows(
            rows,
            ids.iter().map(|s| s.to_string()).collect(),
            (0..rows.len()).map(|i| format!("S{}", i)).collect(),
        )
        .unwrap();
        let pseudo = replace_zeros_czm(&counts, &CzmConfig::default()).unwrap();
        let props = close(&pseudo).unwrap();
        (pseudo, props)
    }

    #[test]
    fn test_rare_feature_dropped() {
        // "rare" never exceeds 1 / 100_001 < 1e-4
        let rows = vec![vec![50_000, 50_000, 1], vec![30_000, 70_000, 1]];
        let (pseudo, props) = create_tables(&rows, &["x", "y", "rare"]);
        let filtered = filter_max_abundance(&props, &pseudo, DEFAULT_MIN_PROPORTION).unwrap();

        assert_eq!(filtered.n_features(), 2);
        assert_eq!(filtered.dropped_features, vec!["rare"]);
        assert!(filtered.order.position("rare").is_none());
    }

    #[test]
    fn test_canonical_order_descending_totals() {
        let rows = vec![vec![1, 30, 10], vec![2, 40, 20]];
        let (pseudo, props) = create_tables(&rows, &["low", "high", "mid"]);
        let filtered = filter_max_abundance(&props, &pseudo, 0.0).unwrap();

        assert_eq!(filtered.order.feature_ids, vec!["high", "mid", "low"]);
        assert!(filtered.order.matches(&filtered.matrix.feature_ids));
        assert!(filtered.order.totals.windows(2).all(|w| w[0] >= w[1]));
        // Column values move with their feature
        assert_eq!(
            filtered.matrix.get_by_id("S0", "high"),
            props.matrix.get_by_id("S0", "high")
        );
    }

    #[test]
    fn test_ties_broken_by_identifier() {
        let rows = vec![vec![5, 5, 5]];
        let (pseudo, props) = create_tables(&rows, &["c", "a", "b"]);
        let filtered = filter_max_abundance(&props, &pseudo, 0.0).unwrap();
        assert_eq!(filtered.order.feature_ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_monotone_in_threshold() {
        let rows = vec![vec![500, 30, 7, 1, 0], vec![400, 60, 3, 2, 1], vec![900, 5, 0, 0, 4]];
        let (pseudo, props) = create_tables(&rows, &["a", "b", "c", "d", "e"]);
        let mut previous = usize::MAX;
        for tau in [0.0, 1e-4, 1e-3, 5e-3, 1e-2, 5e-2, 0.2, 0.9] {
            let n = filter_max_abundance(&props, &pseudo, tau)
                .map(|t| t.n_features())
                .unwrap_or(0);
            assert!(n <= previous, "tau {} kept {} > {}", tau, n, previous);
            previous = n;
        }
    }

    #[test]
    fn test_invalid_threshold() {
        let rows = vec![vec![5, 5]];
        let (pseudo, props) = create_tables(&rows, &["a", "b"]);
        assert!(filter_max_abundance(&props, &pseudo, -0.1).is_err());
        assert!(filter_max_abundance(&props, &pseudo, 1.1).is_err());
    }

    #[test]
    fn test_summary() {
        let rows = vec![vec![50_000, 50_000, 1], vec![30_000, 70_000, 1]];
        let (pseudo, props) = create_tables(&rows, &["x", "y", "rare"]);
        let summary = filter_max_abundance(&props, &pseudo, DEFAULT_MIN_PROPORTION)
            .unwrap()
            .summary();
        assert_eq!(summary.n_before, 3);
        assert_eq!(summary.n_removed, 1);
        assert!((summary.retention_rate - 2.0 / 3.0).abs() < 1e-10);
    }
}
