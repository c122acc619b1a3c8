//! Ordination of CLR coordinates.

pub mod pca;

pub use pca::{pca, pca_matrix, PcaResult, RANK_TOLERANCE};
