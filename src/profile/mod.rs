//! Data profiling primitives for understanding count matrix characteristics.

mod sparsity;
mod zero_pattern;

pub use sparsity::{profile_sparsity, SparsityProfile};
pub use zero_pattern::{drop_all_zero_samples, profile_zero_patterns, ZeroPattern, ZeroPatternProfile};
