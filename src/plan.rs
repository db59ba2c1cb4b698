//! Plan model
//!
//! The planner's output is untrusted: steps may arrive as bare action tags
//! (`"load_data"`) or as agent directives (`{"agent": "data_agent"}`). Both
//! shapes are kept as-is in [`Step`] and normalised to a [`LogicalAction`]
//! only at dispatch time.

use crate::error::{PipelineError, Result};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt;
use tracing::warn;

/// One instruction within a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Step {
    /// Bare action tag, e.g. `"generate_insights"`.
    Named(String),
    /// Agent + optional advisory action, e.g. `{"agent": "evaluator"}`.
    Directive {
        agent: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        action: Option<String>,
    },
}

/// The canonical effects a step can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalAction {
    LoadData,
    AnalyzeMetrics,
    GenerateInsights,
    EvaluateInsights,
    ProduceCreatives,
}

impl LogicalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalAction::LoadData => "load_data",
            LogicalAction::AnalyzeMetrics => "analyze_metrics",
            LogicalAction::GenerateInsights => "generate_insights",
            LogicalAction::EvaluateInsights => "evaluate_insights",
            LogicalAction::ProduceCreatives => "produce_creatives",
        }
    }

    /// Resolve an action tag or agent id. Case and surrounding whitespace
    /// are ignored.
    pub fn resolve(token: &str) -> Option<Self> {
        match token.trim().to_lowercase().as_str() {
            "load_data" | "data_agent" => Some(LogicalAction::LoadData),
            "analyze_metrics" => Some(LogicalAction::AnalyzeMetrics),
            "generate_insights" | "insight_agent" => Some(LogicalAction::GenerateInsights),
            "evaluate_insights" | "evaluator" => Some(LogicalAction::EvaluateInsights),
            "produce_creatives" | "creative_generator" => Some(LogicalAction::ProduceCreatives),
            _ => None,
        }
    }
}

impl fmt::Display for LogicalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Step {
    pub fn named(action: impl Into<String>) -> Self {
        Step::Named(action.into())
    }

    pub fn directive(agent: impl Into<String>, action: Option<&str>) -> Self {
        Step::Directive {
            agent: agent.into(),
            action: action.map(str::to_string),
        }
    }

    /// `None` for identifiers outside the vocabulary.
    pub fn logical_action(&self) -> Option<LogicalAction> {
        match self {
            Step::Named(name) => LogicalAction::resolve(name),
            // The directive's action is advisory; only the agent decides.
            Step::Directive { agent, .. } => LogicalAction::resolve(agent),
        }
    }

    /// Raw identifier, for logs and audit records.
    pub fn label(&self) -> &str {
        match self {
            Step::Named(name) => name,
            Step::Directive { agent, .. } => agent,
        }
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(name) => Some(Step::Named(name.clone())),
            Value::Object(map) => {
                let agent = map.get("agent")?.as_str()?;
                let action = map.get("action").and_then(Value::as_str);
                Some(Step::directive(agent, action))
            }
            _ => None,
        }
    }
}

/// Ordered, non-empty list of steps. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    steps: Vec<Step>,
}

impl Plan {
    pub fn new(steps: Vec<Step>) -> Result<Self> {
        if steps.is_empty() {
            return Err(PipelineError::Plan("plan has no steps".to_string()));
        }
        Ok(Self { steps })
    }

    /// Build a plan from a planner document: `{"steps": [...]}`.
    ///
    /// Elements that are neither a string nor an object with a string
    /// `agent` are dropped. A missing or empty `steps` list is fatal, as is a
    /// list with no usable element.
    pub fn from_document(document: &Map<String, Value>) -> Result<Self> {
        let raw_steps = document
            .get("steps")
            .ok_or_else(|| PipelineError::Plan("plan document has no \"steps\" key".to_string()))?
            .as_array()
            .ok_or_else(|| PipelineError::Plan("\"steps\" must be an array".to_string()))?;

        if raw_steps.is_empty() {
            return Err(PipelineError::Plan("\"steps\" is empty".to_string()));
        }

        let steps: Vec<Step> = raw_steps
            .iter()
            .filter_map(|value| {
                let step = Step::from_value(value);
                if step.is_none() {
                    warn!("⚠️  Dropping unusable plan step: {}", value);
                }
                step
            })
            .collect();

        if steps.is_empty() {
            return Err(PipelineError::Plan(
                "\"steps\" contains no usable step".to_string(),
            ));
        }
        Ok(Self { steps })
    }

    /// data_agent → insight_agent → evaluator → creative_generator
    pub fn fallback() -> Self {
        Self {
            steps: vec![
                Step::directive("data_agent", Some("load_and_prepare")),
                Step::directive("insight_agent", Some("generate_hypotheses")),
                Step::directive("evaluator", Some("evaluate")),
                Step::directive("creative_generator", Some("generate")),
            ],
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn to_document(&self) -> Value {
        json!({ "steps": self.steps })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_mixed_step_shapes_parsed() {
        let plan = Plan::from_document(&document(json!({
            "steps": [
                "load_data",
                {"agent": "insight_agent", "action": "generate_hypotheses"},
                {"agent": "evaluator"}
            ]
        })))
        .unwrap();

        assert_eq!(plan.len(), 3);
        assert_eq!(plan.steps()[0], Step::named("load_data"));
        assert_eq!(
            plan.steps()[1],
            Step::directive("insight_agent", Some("generate_hypotheses"))
        );
        assert_eq!(plan.steps()[2], Step::directive("evaluator", None));
    }

    #[test]
    fn test_missing_steps_is_fatal() {
        let err = Plan::from_document(&document(json!({"plan": []}))).unwrap_err();
        assert!(matches!(err, PipelineError::Plan(_)));

        assert!(Plan::from_document(&document(json!({"steps": "load_data"}))).is_err());
        assert!(Plan::from_document(&document(json!({"steps": []}))).is_err());
        assert!(Plan::from_document(&document(json!({"steps": [1, null, {"action": "x"}]}))).is_err());
    }

    #[test]
    fn test_unusable_elements_dropped() {
        let plan = Plan::from_document(&document(json!({
            "steps": [42, "produce_creatives", {"action": "orphan"}]
        })))
        .unwrap();
        assert_eq!(plan.steps(), &[Step::named("produce_creatives")]);
    }

    #[test]
    fn test_equivalence_table() {
        let pairs = [
            ("load_data", "data_agent", LogicalAction::LoadData),
            ("generate_insights", "insight_agent", LogicalAction::GenerateInsights),
            ("evaluate_insights", "evaluator", LogicalAction::EvaluateInsights),
            ("produce_creatives", "creative_generator", LogicalAction::ProduceCreatives),
        ];
        for (tag, agent, expected) in pairs {
            assert_eq!(Step::named(tag).logical_action(), Some(expected));
            assert_eq!(Step::directive(agent, Some("whatever")).logical_action(), Some(expected));
        }
        assert_eq!(
            Step::named("analyze_metrics").logical_action(),
            Some(LogicalAction::AnalyzeMetrics)
        );
    }

    #[test]
    fn test_normalisation_and_unknown_actions() {
        assert_eq!(Step::named("  Load_Data ").logical_action(), Some(LogicalAction::LoadData));
        assert_eq!(Step::named("summon_wizard").logical_action(), None);
        assert_eq!(Step::directive("reporting_agent", None).logical_action(), None);
    }

    #[test]
    fn test_fallback_plan() {
        let plan = Plan::fallback();
        let agents: Vec<&str> = plan.steps().iter().map(Step::label).collect();
        assert_eq!(
            agents,
            vec!["data_agent", "insight_agent", "evaluator", "creative_generator"]
        );
        assert!(plan
            .steps()
            .iter()
            .all(|s| matches!(s, Step::Directive { .. })));
    }

    #[test]
    fn test_document_round_trip_shape() {
        let plan = Plan::new(vec![Step::named("load_data"), Step::directive("evaluator", None)]).unwrap();
        assert_eq!(
            plan.to_document(),
            json!({"steps": ["load_data", {"agent": "evaluator"}]})
        );
        assert!(Plan::new(Vec::new()).is_err());
    }
}
