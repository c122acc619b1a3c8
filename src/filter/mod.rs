//! Feature filtering on proportions.

pub mod abundance;

pub use abundance::{
    filter_max_abundance, AbundanceFilterResult, FeatureOrder, FilteredProportionTable,
    DEFAULT_MIN_PROPORTION,
};
