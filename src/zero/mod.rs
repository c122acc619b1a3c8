//! Zero handling before log-ratio transforms.

pub mod czm;

pub use czm::{
    replace_zeros_czm, sparsity_warnings, CzmConfig, PseudoCountTable, SparsityScope,
    SparsityWarning,
};
