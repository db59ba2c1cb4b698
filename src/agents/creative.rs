use crate::agents::structured::{AgentKind, RecoveryPolicy, StructuredCaller};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::executor::AnalysisWindow;
use crate::metrics::DataAgent;
use crate::prompts::{assemble, PromptLibrary};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::cmp::Ordering;
use tracing::info;

const SAMPLE_MESSAGES_PER_CAMPAIGN: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreativeIdea {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_name: Option<String>,
    pub headline: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_to_action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

/// A campaign under the CTR threshold, with the copy it currently runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LowPerformer {
    pub campaign_name: String,
    pub ctr: f64,
    pub impressions: f64,
    pub sample_messages: Vec<String>,
}

pub struct CreativeGenerator {
    caller: StructuredCaller,
    template: String,
    temperature: f32,
    low_ctr: f64,
    max_low_performers: usize,
}

impl CreativeGenerator {
    pub fn new(config: &PipelineConfig, prompts: &PromptLibrary, caller: StructuredCaller) -> Self {
        Self {
            caller,
            template: prompts.creative.clone(),
            temperature: config.llm.temperatures.creative,
            low_ctr: config.thresholds.low_ctr,
            max_low_performers: config.thresholds.max_low_performers,
        }
    }

    /// Campaigns in the current window with CTR under the threshold, worst first.
    pub fn low_performers(&self, window: &AnalysisWindow) -> Result<Vec<LowPerformer>> {
        let mut campaigns: Vec<_> = DataAgent::campaign_rollup(&window.current)?
            .into_iter()
            .filter(|c| c.ctr < self.low_ctr)
            .collect();
        campaigns.sort_by(|a, b| a.ctr.partial_cmp(&b.ctr).unwrap_or(Ordering::Equal));
        campaigns.truncate(self.max_low_performers);

        campaigns
            .into_iter()
            .map(|c| -> Result<LowPerformer> {
                Ok(LowPerformer {
                    sample_messages: window
                        .current
                        .sample_messages(&c.campaign_name, SAMPLE_MESSAGES_PER_CAMPAIGN)?,
                    campaign_name: c.campaign_name,
                    ctr: c.ctr,
                    impressions: c.impressions,
                })
            })
            .collect()
    }

    pub async fn generate(&self, window: &AnalysisWindow) -> Result<Vec<CreativeIdea>> {
        let low_performers = self.low_performers(window)?;
        if low_performers.is_empty() {
            info!("🎨 No campaigns under CTR {}, skipping creative generation", self.low_ctr);
            self.caller.audit().record(
                "creative_no_low_performers",
                json!({ "low_ctr": self.low_ctr }),
            );
            return Ok(Vec::new());
        }

        let prompt = assemble(
            &self.template,
            AgentKind::Creative.name(),
            &[
                ("CTR THRESHOLD", self.low_ctr.to_string()),
                ("LOW PERFORMERS", serde_json::to_string_pretty(&low_performers)?),
            ],
        );

        let ideas: Vec<CreativeIdea> = self
            .caller
            .produce(
                AgentKind::Creative,
                &prompt,
                self.temperature,
                RecoveryPolicy::Propagate,
            )
            .await?;

        info!(
            "🎨 {} creative ideas for {} low-CTR campaigns",
            ideas.len(),
            low_performers.len()
        );
        Ok(ideas)
    }
}
