//! Normalization of compositional data.
//!
//! - **closure**: pseudo-counts to proportions (each sample sums to one)
//! - **CLR**: centered log-ratio coordinates on filtered proportions

pub mod closure;
pub mod clr;

pub use closure::{close, close_matrix, ProportionTable, CLOSURE_TOLERANCE};
pub use clr::{clr_matrix, norm_clr, ClrTable};
