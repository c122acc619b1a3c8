//! Pipeline composition and execution.

mod runner;

pub use runner::{
    AllZeroPolicy, GroupTestConfig, GroupTestSummary, Pipeline, PipelineConfig, PipelineOutput,
    PipelineReport,
};
