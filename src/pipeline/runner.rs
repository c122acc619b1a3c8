//! Pipeline runner: raw counts through CLR to ordination and clustering.

use crate::cluster::{aitchison_distances, ward_linkage, Dendrogram, DistanceMatrix};
use crate::data::{Metadata, MissingValueReport, RawTable, TableFormat};
use crate::error::{CodaError, Result};
use crate::filter::{filter_max_abundance, FilteredProportionTable, DEFAULT_MIN_PROPORTION};
use crate::normalize::{close, norm_clr, ClrTable, ProportionTable};
use crate::ordination::{pca, PcaResult};
use crate::profile::{drop_all_zero_samples, profile_zero_patterns, ZeroPatternProfile};
use crate::test::{compare_groups, GroupComparison, Grouping, TestMethod};
use crate::zero::{replace_zeros_czm, CzmConfig, PseudoCountTable};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// What to do with samples whose counts are all zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllZeroPolicy {
    /// Stop with a structural error naming the sample.
    #[default]
    Fail,
    /// Remove the sample, log a warning and carry on.
    Drop,
}

/// Settings of the optional two-group comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupTestConfig {
    /// Categorical metadata column holding the groups.
    pub column: String,
    /// Test to run on each CLR feature.
    #[serde(default)]
    pub method: TestMethod,
    /// Reference level; the alphabetically first level when absent.
    #[serde(default)]
    pub reference: Option<String>,
}

/// Pipeline configuration for serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Name of the run.
    #[serde(default = "default_name")]
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Layout of the count table.
    #[serde(default)]
    pub format: TableFormat,
    /// Handling of all-zero samples.
    #[serde(default)]
    pub all_zero: AllZeroPolicy,
    /// Zero replacement parameters.
    #[serde(default)]
    pub czm: CzmConfig,
    /// Minimum proportion a feature must reach in some sample.
    #[serde(default = "default_min_proportion")]
    pub min_proportion: f64,
    /// Number of principal components written to score and loading tables.
    #[serde(default = "default_n_components")]
    pub n_components: usize,
    /// Metadata column used to label PCA scores.
    #[serde(default)]
    pub color_by: Option<String>,
    /// Optional two-group comparison of CLR features.
    #[serde(default)]
    pub group_test: Option<GroupTestConfig>,
}

fn default_name() -> String {
    "coda".to_string()
}

fn default_min_proportion() -> f64 {
    DEFAULT_MIN_PROPORTION
}

fn default_n_components() -> usize {
    2
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            description: None,
            format: TableFormat::default(),
            all_zero: AllZeroPolicy::default(),
            czm: CzmConfig::default(),
            min_proportion: default_min_proportion(),
            n_components: default_n_components(),
            color_by: None,
            group_test: None,
        }
    }
}

impl PipelineConfig {
    /// Load from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(CodaError::from)
    }

    /// Save to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(CodaError::from)
    }

    /// Load from JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(CodaError::from)
    }

    /// Save to pretty-printed JSON string.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(CodaError::from)
    }

    /// Load from a file; `.json` files are JSON, anything else YAML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&text),
            _ => Self::from_yaml(&text),
        }
    }
}

/// Builder for configuring and running the analysis.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Pipeline with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from a config.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Current configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Set the run name.
    pub fn name(mut self, name: &str) -> Self {
        self.config.name = name.to_string();
        self
    }

    /// Set the count table layout.
    pub fn format(mut self, format: TableFormat) -> Self {
        self.config.format = format;
        self
    }

    /// Set the all-zero sample policy.
    pub fn all_zero_policy(mut self, policy: AllZeroPolicy) -> Self {
        self.config.all_zero = policy;
        self
    }

    /// Set zero replacement parameters.
    pub fn czm(mut self, czm: CzmConfig) -> Self {
        self.config.czm = czm;
        self
    }

    /// Set the abundance threshold.
    pub fn min_proportion(mut self, min_proportion: f64) -> Self {
        self.config.min_proportion = min_proportion;
        self
    }

    /// Set how many components are written out.
    pub fn n_components(mut self, n: usize) -> Self {
        self.config.n_components = n;
        self
    }

    /// Label PCA scores with a metadata column.
    pub fn color_by(mut self, column: &str) -> Self {
        self.config.color_by = Some(column.to_string());
        self
    }

    /// Add a two-group comparison on a metadata column.
    pub fn group_test(mut self, column: &str, method: TestMethod, reference: Option<&str>) -> Self {
        self.config.group_test = Some(GroupTestConfig {
            column: column.to_string(),
            method,
            reference: reference.map(String::from),
        });
        self
    }

    /// Export the configuration.
    pub fn to_config(&self) -> PipelineConfig {
        self.config.clone()
    }

    /// Read the count table (and metadata, if given) from disk and run.
    pub fn run_files<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        counts: P,
        metadata: Option<Q>,
    ) -> Result<PipelineOutput> {
        let raw = RawTable::from_delimited(counts, &self.config.format)
            .map_err(|e| e.in_stage("input"))?;
        let metadata = metadata
            .map(|p| Metadata::from_delimited(p, self.config.format.delimiter))
            .transpose()
            .map_err(|e| e.in_stage("input"))?;
        self.run(&raw, metadata.as_ref())
    }

    /// Run every stage on a raw table.
    ///
    /// Any stage failure aborts the run; the error names the stage.
    pub fn run(&self, raw: &RawTable, metadata: Option<&Metadata>) -> Result<PipelineOutput> {
        let cfg = &self.config;
        log::info!(
            "Running '{}' on {} features x {} samples",
            cfg.name,
            raw.n_features(),
            raw.n_samples()
        );

        let (counts, missing) = raw.fill_missing().map_err(|e| e.in_stage("missing values"))?;

        let zero_patterns = profile_zero_patterns(&counts);
        log::info!(
            "{} distinct zero patterns across {} samples",
            zero_patterns.n_patterns(),
            counts.n_samples()
        );
        let (counts, dropped_samples) = match cfg.all_zero {
            AllZeroPolicy::Fail => {
                zero_patterns
                    .ensure_no_all_zero()
                    .map_err(|e| e.in_stage("zero patterns"))?;
                (counts, Vec::new())
            }
            AllZeroPolicy::Drop => drop_all_zero_samples(&counts, &zero_patterns)
                .map_err(|e| e.in_stage("zero patterns"))?,
        };

        let pseudo_counts =
            replace_zeros_czm(&counts, &cfg.czm).map_err(|e| e.in_stage("zero replacement"))?;
        let proportions = close(&pseudo_counts).map_err(|e| e.in_stage("closure"))?;
        let filtered = filter_max_abundance(&proportions, &pseudo_counts, cfg.min_proportion)
            .map_err(|e| e.in_stage("abundance filter"))?;
        let clr = norm_clr(&filtered).map_err(|e| e.in_stage("clr transform"))?;

        let pca = pca(&clr).map_err(|e| e.in_stage("ordination"))?;
        let distances = aitchison_distances(&clr).map_err(|e| e.in_stage("distance"))?;
        let dendrogram = ward_linkage(&distances).map_err(|e| e.in_stage("clustering"))?;

        let group_labels = match (&cfg.color_by, metadata) {
            (Some(column), Some(meta)) => Some(
                meta.labels_for(column, clr.sample_ids())
                    .map_err(|e| e.in_stage("metadata"))?,
            ),
            (Some(_), None) => {
                return Err(CodaError::Pipeline(
                    "color_by needs a metadata table".to_string(),
                ))
            }
            _ => None,
        };

        let group_test = match (&cfg.group_test, metadata) {
            (Some(settings), Some(meta)) => {
                let grouping = Grouping::from_metadata(
                    meta,
                    &settings.column,
                    clr.sample_ids(),
                    settings.reference.as_deref(),
                )
                .map_err(|e| e.in_stage("group test"))?;
                let test = settings.method.build();
                Some(
                    compare_groups(&clr, &grouping, test.as_ref())
                        .map_err(|e| e.in_stage("group test"))?,
                )
            }
            (Some(_), None) => {
                return Err(CodaError::Pipeline(
                    "group test needs a metadata table".to_string(),
                ))
            }
            (None, _) => None,
        };

        log::info!(
            "Finished: {} samples, {} features, PC1 explains {:.1}%",
            clr.n_samples(),
            clr.n_features(),
            pca.explained_ratio.first().copied().unwrap_or(0.0) * 100.0
        );

        Ok(PipelineOutput {
            name: cfg.name.clone(),
            n_components: cfg.n_components,
            input_features: raw.n_features(),
            input_samples: raw.n_samples(),
            missing,
            zero_patterns,
            dropped_samples,
            pseudo_counts,
            proportions,
            filtered,
            clr,
            pca,
            distances,
            dendrogram,
            group_labels,
            group_test,
        })
    }
}

/// Every table produced by a run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub name: String,
    /// Components written to score and loading tables.
    pub n_components: usize,
    pub input_features: usize,
    pub input_samples: usize,
    pub missing: MissingValueReport,
    pub zero_patterns: ZeroPatternProfile,
    pub dropped_samples: Vec<String>,
    pub pseudo_counts: PseudoCountTable,
    pub proportions: ProportionTable,
    pub filtered: FilteredProportionTable,
    pub clr: ClrTable,
    pub pca: PcaResult,
    pub distances: DistanceMatrix,
    pub dendrogram: Dendrogram,
    /// Metadata label per CLR sample, when `color_by` was set.
    pub group_labels: Option<Vec<Option<String>>>,
    pub group_test: Option<GroupComparison>,
}

/// Summary written to `report.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub name: String,
    pub input_features: usize,
    pub input_samples: usize,
    pub n_missing_coerced: usize,
    pub n_zero_patterns: usize,
    pub dropped_samples: Vec<String>,
    pub n_replaced: usize,
    pub n_adjusted: usize,
    pub warnings: Vec<String>,
    pub min_proportion: f64,
    pub dropped_features: Vec<String>,
    pub feature_order: Vec<String>,
    pub n_samples: usize,
    pub n_features: usize,
    pub explained_ratio: Vec<f64>,
    pub rank: usize,
    pub leaf_order: Vec<String>,
    pub group_test: Option<GroupTestSummary>,
}

/// Short summary of a group comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupTestSummary {
    pub method: String,
    pub column: String,
    pub reference: String,
    pub comparison: String,
    /// Features with q < 0.05.
    pub n_significant: usize,
}

impl PipelineOutput {
    /// Summary of the run.
    pub fn report(&self) -> PipelineReport {
        PipelineReport {
            name: self.name.clone(),
            input_features: self.input_features,
            input_samples: self.input_samples,
            n_missing_coerced: self.missing.n_coerced,
            n_zero_patterns: self.zero_patterns.n_patterns(),
            dropped_samples: self.dropped_samples.clone(),
            n_replaced: self.pseudo_counts.n_replaced,
            n_adjusted: self.pseudo_counts.n_adjusted,
            warnings: self
                .pseudo_counts
                .warnings
                .iter()
                .map(|w| w.to_string())
                .collect(),
            min_proportion: self.filtered.min_proportion,
            dropped_features: self.filtered.dropped_features.clone(),
            feature_order: self.filtered.order.feature_ids.clone(),
            n_samples: self.clr.n_samples(),
            n_features: self.clr.n_features(),
            explained_ratio: self.pca.explained_ratio.clone(),
            rank: self.pca.rank,
            leaf_order: self
                .dendrogram
                .ordered_sample_ids()
                .into_iter()
                .map(String::from)
                .collect(),
            group_test: self.group_test.as_ref().map(|g| GroupTestSummary {
                method: g.method.clone(),
                column: g.column.clone(),
                reference: g.reference.clone(),
                comparison: g.comparison.clone(),
                n_significant: g.n_significant(0.05),
            }),
        }
    }

    /// Write all output tables and `report.json` into `dir`, creating it if needed.
    pub fn write_dir<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        self.filtered.to_tsv(dir.join("proportions.tsv"))?;
        self.filtered.order_to_tsv(dir.join("feature_order.tsv"))?;
        self.clr.to_tsv(dir.join("clr.tsv"))?;
        self.pca.scores_to_tsv(
            dir.join("pca_scores.tsv"),
            self.n_components,
            self.group_labels.as_deref(),
        )?;
        self.pca
            .loadings_to_tsv(dir.join("pca_loadings.tsv"), self.n_components)?;
        self.pca.scree_to_tsv(dir.join("scree.tsv"))?;
        self.distances.to_tsv(dir.join("distances.tsv"))?;
        self.dendrogram.to_tsv(dir.join("dendrogram.tsv"))?;
        self.dendrogram.leaf_order_to_tsv(dir.join("leaf_order.tsv"))?;
        self.zero_patterns.to_tsv(dir.join("zero_patterns.tsv"))?;
        if let Some(test) = &self.group_test {
            test.to_tsv(dir.join("group_test.tsv"))?;
        }

        let report = serde_json::to_string_pretty(&self.report())?;
        fs::write(dir.join("report.json"), report)?;

        log::info!("Wrote results to {}", dir.display());
        Ok(())
    }
}
