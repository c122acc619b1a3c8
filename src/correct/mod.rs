//! Multiple testing correction.

pub mod bh;

pub use bh::{bh_adjust, correct_bh, BhCorrected};
