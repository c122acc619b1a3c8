//! Two-group comparison of CLR coordinates.
//!
//! Tests are swappable through the [`GroupTest`] trait; [`compare_groups`]
//! runs one over every feature and adds Benjamini-Hochberg q-values.

pub mod grouping;
pub mod wilcoxon;

pub use compare::{compare_groups, GroupComparison, GroupTestResult};
pub use grouping::{GroupSide, Grouping};
pub use welch::WelchTest;
pub use wilcoxon::WilcoxonTest;

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Statistic and p-value of one feature's test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    /// Test statistic.
    pub statistic: f64,
    /// Two-sided p-value; NaN when the test is undefined.
    pub p_value: f64,
    /// Degrees of freedom, for tests that have them.
    pub df: Option<f64>,
}

impl TestOutcome {
    /// Outcome of a test that could not be computed.
    pub fn undefined() -> Self {
        Self {
            statistic: f64::NAN,
            p_value: f64::NAN,
            df: None,
        }
    }
}

/// A two-sample location test.
///
/// `comparison` is tested against `reference`; positive statistics mean the
/// comparison group is larger.
pub trait GroupTest: Send + Sync {
    /// Short method name used in reports.
    fn name(&self) -> &'static str;

    /// Test one feature.
    fn test(&self, reference: &[f64], comparison: &[f64]) -> Result<TestOutcome>;
}

/// Available tests, as named in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestMethod {
    /// Welch's unequal-variance t-test.
    #[default]
    Welch,
    /// Wilcoxon rank-sum test.
    Wilcoxon,
}

impl TestMethod {
    /// Boxed test for this method.
    pub fn build(self) -> Box<dyn GroupTest> {
        match self {
            TestMethod::Welch => Box::new(WelchTest),
            TestMethod::Wilcoxon => Box::new(WilcoxonTest),
        }
    }
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance (denominator `n - 1`).
pub(crate) fn variance(values: &[f64]) -> f64 {
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() as f64 - 1.0)
}
