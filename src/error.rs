//! Error types for the composable-coda library.

use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum CodaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid count value '{value}' at row {row}, column {col}")]
    InvalidCount {
        value: String,
        row: usize,
        col: usize,
    },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Sample ID mismatch: {0}")]
    SampleMismatch(String),

    #[error("Missing column '{0}' in metadata")]
    MissingColumn(String),

    #[error("Empty data: {0}")]
    EmptyData(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A sample or feature violates a structural precondition.
    #[error("Structural error in {stage}: '{id}' {reason}")]
    Structural {
        stage: &'static str,
        id: String,
        reason: String,
    },

    /// A non-positive value reached a logarithm.
    #[error("Domain error in {stage}: value {value} for sample '{sample}', feature '{feature}' is not strictly positive")]
    Domain {
        stage: &'static str,
        sample: String,
        feature: String,
        value: f64,
    },

    #[error("Numerical degeneracy in {stage}: {reason}")]
    NumericalDegeneracy { stage: &'static str, reason: String },

    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: Box<CodaError>,
    },

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CodaError {
    /// Wrap an error with the name of the pipeline stage it came from.
    ///
    /// Errors that already carry a stage are returned unchanged.
    pub fn in_stage(self, stage: &'static str) -> Self {
        match self {
            CodaError::Stage { .. } => self,
            other => CodaError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Innermost error, looking through stage wrappers.
    pub fn root(&self) -> &CodaError {
        match self {
            CodaError::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether this is a structural precondition failure.
    pub fn is_structural(&self) -> bool {
        matches!(
            self.root(),
            CodaError::Structural { .. } | CodaError::InvalidCount { .. }
        )
    }

    /// Whether this is a log-ratio domain failure.
    pub fn is_domain(&self) -> bool {
        matches!(self.root(), CodaError::Domain { .. })
    }
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, CodaError>;
