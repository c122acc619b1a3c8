//! Zero-pattern analysis: which features are zero in which samples.

use crate::data::CountMatrix;
use crate::error::{CodaError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const STAGE: &str = "zero pattern analysis";

/// One distinct zero/non-zero pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZeroPattern {
    /// Pattern identifier, 1-based in order of first appearance.
    pub id: usize,
    /// `true` where the feature is zero.
    pub mask: Vec<bool>,
    /// Number of samples sharing this pattern.
    pub n_samples: usize,
    /// Number of zero features in the pattern.
    pub n_zeros: usize,
}

impl ZeroPattern {
    /// Fraction of features that are zero.
    pub fn zero_fraction(&self) -> f64 {
        if self.mask.is_empty() {
            0.0
        } else {
            self.n_zeros as f64 / self.mask.len() as f64
        }
    }

    /// Whether every feature is zero, leaving no valid composition.
    pub fn is_all_zero(&self) -> bool {
        self.n_zeros == self.mask.len()
    }

    /// Compact text form, e.g. `"-+-"` with `+` marking a zero.
    pub fn mask_string(&self) -> String {
        self.mask.iter().map(|&z| if z { '+' } else { '-' }).collect()
    }
}

/// Per-sample zero patterns and their frequencies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZeroPatternProfile {
    /// Sample identifiers.
    pub sample_ids: Vec<String>,
    /// Feature identifiers (mask positions).
    pub feature_ids: Vec<String>,
    /// Pattern id for each sample.
    pub sample_patterns: Vec<usize>,
    /// Distinct patterns, ordered by id.
    pub patterns: Vec<ZeroPattern>,
}

impl ZeroPatternProfile {
    /// Number of distinct patterns.
    pub fn n_patterns(&self) -> usize {
        self.patterns.len()
    }

    /// Pattern assigned to a sample.
    pub fn pattern_of(&self, sample: usize) -> &ZeroPattern {
        &self.patterns[self.sample_patterns[sample] - 1]
    }

    /// Indices of samples whose pattern is "all features zero".
    pub fn all_zero_samples(&self) -> Vec<usize> {
        (0..self.sample_ids.len())
            .filter(|&s| self.pattern_of(s).is_all_zero())
            .collect()
    }

    /// Fail with a structural error naming the first all-zero sample.
    pub fn ensure_no_all_zero(&self) -> Result<()> {
        match self.all_zero_samples().first() {
            Some(&s) => Err(CodaError::Structural {
                stage: STAGE,
                id: self.sample_ids[s].clone(),
                reason: "has all features zero; no composition exists".to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Write the pattern frequency table as TSV.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "pattern_id\tn_samples\tn_zeros\tzero_fraction\tmask")?;
        for p in &self.patterns {
            writeln!(
                writer,
                "{}\t{}\t{}\t{:.4}\t{}",
                p.id,
                p.n_samples,
                p.n_zeros,
                p.zero_fraction(),
                p.mask_string()
            )?;
        }
        Ok(())
    }
}

impl std::fmt::Display for ZeroPatternProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Zero Patterns")?;
        writeln!(f, "  Samples:           {}", self.sample_ids.len())?;
        writeln!(f, "  Distinct patterns: {}", self.n_patterns())?;
        writeln!(f, "  All-zero samples:  {}", self.all_zero_samples().len())?;
        for p in self.patterns.iter().take(10) {
            writeln!(
                f,
                "  #{:<4} {:>5} samples  {:>5.1}% zeros",
                p.id,
                p.n_samples,
                p.zero_fraction() * 100.0
            )?;
        }
        Ok(())
    }
}

/// Classify each sample's zero/non-zero pattern.
pub fn profile_zero_patterns(counts: &CountMatrix) -> ZeroPatternProfile {
    let n_features = counts.n_features();
    let n_samples = counts.n_samples();

    let mut masks = vec![vec![true; n_features]; n_samples];
    for (feature, row_vec) in counts.data().outer_iterator().enumerate() {
        for (sample, &val) in row_vec.iter() {
            if val > 0 {
                masks[sample][feature] = false;
            }
        }
    }

    let mut index: HashMap<Vec<bool>, usize> = HashMap::new();
    let mut patterns: Vec<ZeroPattern> = Vec::new();
    let mut sample_patterns = Vec::with_capacity(n_samples);

    for mask in masks {
        let id = match index.get(&mask) {
            Some(&id) => id,
            None => {
                let id = patterns.len() + 1;
                patterns.push(ZeroPattern {
                    id,
                    n_zeros: mask.iter().filter(|&&z| z).count(),
                    mask: mask.clone(),
                    n_samples: 0,
                });
                index.insert(mask, id);
                id
            }
        };
        patterns[id - 1].n_samples += 1;
        sample_patterns.push(id);
    }

    ZeroPatternProfile {
        sample_ids: counts.sample_ids().to_vec(),
        feature_ids: counts.feature_ids().to_vec(),
        sample_patterns,
        patterns,
    }
}

/// Remove samples whose pattern is "all features zero".
///
/// Returns the reduced matrix and the identifiers of the removed samples.
pub fn drop_all_zero_samples(
    counts: &CountMatrix,
    profile: &ZeroPatternProfile,
) -> Result<(CountMatrix, Vec<String>)> {
    let dropped = profile.all_zero_samples();
    if dropped.is_empty() {
        return Ok((counts.clone(), Vec::new()));
    }

    let keep: Vec<usize> = (0..counts.n_samples())
        .filter(|s| !dropped.contains(s))
        .collect();
    if keep.is_empty() {
        return Err(CodaError::EmptyData(
            "Every sample has all features zero".to_string(),
        ));
    }

    let dropped_ids: Vec<String> = dropped
        .iter()
        .map(|&s| counts.sample_ids()[s].clone())
        .collect();
    for id in &dropped_ids {
        log::warn!("Removing sample '{}': all features are zero", id);
    }

    Ok((counts.subset_samples(&keep)?, dropped_ids))
}
