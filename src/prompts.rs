//! Agent Prompts - instruction templates for the generative agents
//!
//! Each agent has a built-in template. A configured prompts directory may
//! replace any of them with `<agent>.md`.

use crate::error::{PipelineError, Result};
use std::path::Path;
use tracing::info;

pub const PLANNER_PROMPT: &str = r#"You are the planning agent of a Facebook Ads performance analysis pipeline.

Decide which pipeline capabilities are needed to answer the user's query and return them as an ordered plan.

Available agents:
- data_agent: loads the dataset and computes the metric summary (CTR, ROAS, spend)
- insight_agent: proposes hypotheses explaining performance changes (needs the summary)
- evaluator: validates hypotheses against the data (needs hypotheses)
- creative_generator: proposes new creatives for low-CTR campaigns

Return ONLY a JSON object of this shape, with no commentary:
{"steps": [{"agent": "data_agent", "action": "load_and_prepare"}, {"agent": "insight_agent", "action": "generate_hypotheses"}, {"agent": "evaluator", "action": "evaluate"}, {"agent": "creative_generator", "action": "generate"}]}"#;

pub const INSIGHT_PROMPT: &str = r#"You are the insight agent of a Facebook Ads performance analysis pipeline.

Study the metric summary and propose hypotheses that explain changes in performance.

For every hypothesis provide:
- id: short identifier such as "H1"
- issue: the claim, e.g. "CTR dropped for campaign X"
- reason: the suspected driver
- segments: filters that isolate the affected rows, each formatted "column:value" (e.g. "campaign_name:Summer Sale"); use [] for the whole account
- metrics_involved: the metrics that should move if the claim is true; use "ctr" or "roas"

Return ONLY a JSON array of hypothesis objects, with no commentary."#;

pub const EVALUATOR_PROMPT: &str = r#"You are the evaluator agent of a Facebook Ads performance analysis pipeline.

Judge the hypothesis using the numeric evidence. The evidence compares the current window with the period before it; "significant_drop" is true when the current value is lower.

Return ONLY a JSON object of this shape, with no commentary:
{"status": "validated" | "partially_validated" | "rejected", "confidence": 0.0-1.0, "explanation": "...", "next_steps": ["..."]}"#;

pub const CREATIVE_PROMPT: &str = r#"You are the creative generator of a Facebook Ads performance analysis pipeline.

The campaigns below have a click-through rate under the account threshold. Propose fresh ad creatives for them, grounded in the messaging they currently use.

For every idea provide: campaign_name, headline, message, call_to_action, rationale.

Return ONLY a JSON array of idea objects, with no commentary."#;

/// Prompt templates, one per agent.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    pub planner: String,
    pub insight: String,
    pub evaluator: String,
    pub creative: String,
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self {
            planner: PLANNER_PROMPT.to_string(),
            insight: INSIGHT_PROMPT.to_string(),
            evaluator: EVALUATOR_PROMPT.to_string(),
            creative: CREATIVE_PROMPT.to_string(),
        }
    }
}

impl PromptLibrary {
    /// Built-in templates, with `<dir>/<agent>.md` replacing any that exist.
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        let mut library = Self::default();
        let Some(dir) = dir else {
            return Ok(library);
        };

        if !dir.is_dir() {
            return Err(PipelineError::Config(format!(
                "Prompts directory not found: {}",
                dir.display()
            )));
        }

        for (name, slot) in [
            ("planner", &mut library.planner),
            ("insight_agent", &mut library.insight),
            ("evaluator", &mut library.evaluator),
            ("creative_generator", &mut library.creative),
        ] {
            let path = dir.join(format!("{}.md", name));
            if path.is_file() {
                let template = std::fs::read_to_string(&path).map_err(|e| {
                    PipelineError::Prompt(format!("Failed to read {}: {}", path.display(), e))
                })?;
                if template.trim().is_empty() {
                    return Err(PipelineError::Prompt(format!(
                        "Prompt file is empty: {}",
                        path.display()
                    )));
                }
                info!("📝 Using prompt override {}", path.display());
                *slot = template;
            }
        }

        Ok(library)
    }
}

/// Assemble an agent prompt: template, agent header, then labelled sections.
pub fn assemble(template: &str, agent: &str, sections: &[(&str, String)]) -> String {
    let mut prompt = String::with_capacity(template.len() + 256);
    prompt.push_str(template.trim_end());
    prompt.push_str("\n\n## Agent: ");
    prompt.push_str(agent);
    for (label, body) in sections {
        prompt.push_str("\n\n### ");
        prompt.push_str(label);
        prompt.push('\n');
        prompt.push_str(body);
    }
    prompt
}
