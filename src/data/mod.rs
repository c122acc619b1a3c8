//! Data structures for compositional analysis.

mod count_matrix;
mod labeled;
mod metadata;
mod raw_table;

pub use count_matrix::CountMatrix;
pub use labeled::LabeledMatrix;
pub use metadata::{Metadata, Variable, VariableType};
pub use raw_table::{MissingValueReport, Orientation, RawTable, TableFormat};
