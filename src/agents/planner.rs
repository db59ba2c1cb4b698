use crate::agents::structured::{AgentKind, RecoveryPolicy, StructuredCaller};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::plan::Plan;
use crate::prompts::{assemble, PromptLibrary};
use serde_json::{json, Map, Value};
use tracing::info;

/// Turns the user query into a plan.
pub struct Planner {
    caller: StructuredCaller,
    template: String,
    temperature: f32,
}

impl Planner {
    pub fn new(config: &PipelineConfig, prompts: &PromptLibrary, caller: StructuredCaller) -> Self {
        Self {
            caller,
            template: prompts.planner.clone(),
            temperature: config.llm.temperatures.planner,
        }
    }

    pub async fn plan(&self, query: &str) -> Result<Plan> {
        let prompt = assemble(
            &self.template,
            AgentKind::Planner.name(),
            &[("USER QUERY", query.to_string())],
        );

        let document: Map<String, Value> = self
            .caller
            .produce(
                AgentKind::Planner,
                &prompt,
                self.temperature,
                RecoveryPolicy::UseFallback(fallback_document()),
            )
            .await?;

        let plan = Plan::from_document(&document)?;
        info!("🧭 Plan ready with {} steps", plan.len());
        self.caller
            .audit()
            .record("plan_ready", json!({ "plan": plan.to_document() }));
        Ok(plan)
    }
}

fn fallback_document() -> Map<String, Value> {
    match Plan::fallback().to_document() {
        Value::Object(document) => document,
        _ => Map::new(),
    }
}
