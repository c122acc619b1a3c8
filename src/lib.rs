//! Composable Compositional Data Analysis (CoDA) Library
//!
//! This library turns microbiome count tables into log-ratio coordinates and
//! derives ordinations and sample clusterings from them.
//!
//! # Overview
//!
//! The library is organized into composable modules, one per stage:
//!
//! - **data**: Core data structures (RawTable, CountMatrix, LabeledMatrix, Metadata)
//! - **profile**: Zero patterns and sparsity
//! - **zero**: Count zero multiplicative (CZM) replacement
//! - **normalize**: Closure to proportions and the CLR transform
//! - **filter**: Abundance filtering and the canonical feature order
//! - **ordination**: Principal component analysis
//! - **cluster**: Aitchison distances and Ward linkage
//! - **test**: Two-group comparison of CLR features (Welch, Wilcoxon)
//! - **correct**: Multiple testing correction (Benjamini-Hochberg)
//! - **pipeline**: Pipeline configuration and execution
//!
//! Data flows strictly forward: raw counts, zero patterns, replacement,
//! closure, filtering, CLR, then PCA and clustering side by side.
//!
//! # Example
//!
//! ```no_run
//! use composable_coda::prelude::*;
//!
//! let raw = RawTable::from_delimited("otu_table.tsv", &TableFormat::tsv()).unwrap();
//! let metadata = Metadata::from_tsv("metadata.tsv").unwrap();
//!
//! let output = Pipeline::new()
//!     .min_proportion(1e-4)
//!     .color_by("group")
//!     .group_test("group", TestMethod::Welch, None)
//!     .run(&raw, Some(&metadata))
//!     .unwrap();
//!
//! println!("PC1 explains {:.1}%", output.pca.explained_ratio[0] * 100.0);
//! output.write_dir("results").unwrap();
//! ```

pub mod cluster;
pub mod correct;
pub mod data;
pub mod error;
pub mod filter;
pub mod normalize;
pub mod ordination;
pub mod pipeline;
pub mod profile;
pub mod test;
pub mod zero;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::cluster::{
        aitchison_distances, euclidean_distances, ward_linkage, Dendrogram, DistanceMatrix, Merge,
    };
    pub use crate::correct::{bh_adjust, correct_bh, BhCorrected};
    pub use crate::data::{
        CountMatrix, LabeledMatrix, Metadata, MissingValueReport, Orientation, RawTable,
        TableFormat, Variable,
    };
    pub use crate::error::{CodaError, Result};
    pub use crate::filter::{
        filter_max_abundance, AbundanceFilterResult, FeatureOrder, FilteredProportionTable,
        DEFAULT_MIN_PROPORTION,
    };
    pub use crate::normalize::{close, clr_matrix, norm_clr, ClrTable, ProportionTable};
    pub use crate::ordination::{pca, PcaResult};
    pub use crate::pipeline::{
        AllZeroPolicy, Pipeline, PipelineConfig, PipelineOutput, PipelineReport,
    };
    pub use crate::profile::{
        drop_all_zero_samples, profile_sparsity, profile_zero_patterns, SparsityProfile,
        ZeroPattern, ZeroPatternProfile,
    };
    pub use crate::test::{
        compare_groups, GroupComparison, GroupTest, Grouping, TestMethod, WelchTest,
        WilcoxonTest,
    };
    pub use crate::zero::{replace_zeros_czm, CzmConfig, PseudoCountTable, SparsityWarning};
}
