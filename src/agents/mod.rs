//! Generative Agents
//!
//! Each agent assembles a prompt, calls the backend through the shared
//! repair protocol, and maps the parsed document to typed records:
//! - Planner: query → plan
//! - InsightGenerator: summary → hypotheses
//! - Evaluator: hypotheses + data → validation results
//! - CreativeGenerator: low-CTR campaigns → creative ideas

pub mod creative;
pub mod evaluator;
pub mod insight;
pub mod planner;
pub mod structured;

pub use creative::{CreativeGenerator, CreativeIdea};
pub use evaluator::{EvidenceRecord, ValidationResult, ValidationStatus, Evaluator};
pub use insight::{Hypothesis, InsightGenerator};
pub use planner::Planner;
pub use structured::{AgentKind, RecoveryPolicy, StructuredCaller};
