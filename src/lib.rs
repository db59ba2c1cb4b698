pub mod agents;
pub mod audit;
pub mod config;
pub mod dataset;
pub mod error;
pub mod executor;
pub mod llm;
pub mod metrics;
pub mod plan;
pub mod prompts;
pub mod report;
pub mod runner;

pub use error::{PipelineError, Result};
pub use executor::{AnalysisWindow, PlanStepExecutor, ResultBundle};
pub use runner::PipelineRunner;
