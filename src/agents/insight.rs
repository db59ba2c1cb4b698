use crate::agents::structured::{AgentKind, RecoveryPolicy, StructuredCaller};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::metrics::MetricsSummary;
use crate::prompts::{assemble, PromptLibrary};
use serde::{Deserialize, Serialize};
use tracing::info;

/// A candidate explanation for a performance change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    #[serde(default)]
    pub id: String,
    #[serde(alias = "claim", alias = "hypothesis")]
    pub issue: String,
    #[serde(default)]
    pub reason: String,
    /// `column:value` filters selecting the affected rows.
    #[serde(default)]
    pub segments: Vec<String>,
    #[serde(default)]
    pub metrics_involved: Vec<String>,
}

impl Hypothesis {
    pub fn new(id: &str, issue: &str, reason: &str, metrics: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            issue: issue.to_string(),
            reason: reason.to_string(),
            segments: Vec::new(),
            metrics_involved: metrics.iter().map(|m| m.to_string()).collect(),
        }
    }

    pub fn with_segments(mut self, segments: &[&str]) -> Self {
        self.segments = segments.iter().map(|s| s.to_string()).collect();
        self
    }
}

// The model answers with either a bare list or a wrapping object.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum HypothesisDocument {
    List(Vec<Hypothesis>),
    Wrapped { hypotheses: Vec<Hypothesis> },
}

impl HypothesisDocument {
    fn into_vec(self) -> Vec<Hypothesis> {
        match self {
            HypothesisDocument::List(list) => list,
            HypothesisDocument::Wrapped { hypotheses } => hypotheses,
        }
    }
}

pub fn fallback_hypotheses() -> Vec<Hypothesis> {
    vec![
        Hypothesis::new("H1", "Low CTR", "Creative fatigue", &["ctr"]),
        Hypothesis::new("H2", "ROAS Drop", "Weak targeting", &["roas"]),
    ]
}

pub struct InsightGenerator {
    caller: StructuredCaller,
    template: String,
    temperature: f32,
}

impl InsightGenerator {
    pub fn new(config: &PipelineConfig, prompts: &PromptLibrary, caller: StructuredCaller) -> Self {
        Self {
            caller,
            template: prompts.insight.clone(),
            temperature: config.llm.temperatures.insight,
        }
    }

    pub async fn generate(&self, summary: &MetricsSummary, query: &str) -> Result<Vec<Hypothesis>> {
        let prompt = assemble(
            &self.template,
            AgentKind::Insight.name(),
            &[
                ("USER QUERY", query.to_string()),
                ("METRIC SUMMARY", serde_json::to_string_pretty(summary)?),
            ],
        );

        let document = self
            .caller
            .produce(
                AgentKind::Insight,
                &prompt,
                self.temperature,
                RecoveryPolicy::UseFallback(HypothesisDocument::List(fallback_hypotheses())),
            )
            .await?;

        let mut hypotheses = document.into_vec();
        for (i, hypothesis) in hypotheses.iter_mut().enumerate() {
            if hypothesis.id.trim().is_empty() {
                hypothesis.id = format!("H{}", i + 1);
            }
        }

        info!("💡 {} hypotheses generated", hypotheses.len());
        Ok(hypotheses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use crate::llm::ScriptedBackend;
    use std::sync::Arc;

    fn config() -> PipelineConfig {
        PipelineConfig::from_json(
            r#"{
                "data": {"use_sample_data": true, "sample_path": "a.csv", "full_path": "b.csv", "min_impressions": 0},
                "thresholds": {"low_ctr": 0.01},
                "llm": {"temperatures": {"insight": 0.25}}
            }"#,
        )
        .unwrap()
    }

    fn summary() -> MetricsSummary {
        MetricsSummary {
            window_days: 7,
            rows: 0,
            roas_trend: Vec::new(),
            campaign_performance: Vec::new(),
            top_campaigns: Vec::new(),
            bottom_campaigns: Vec::new(),
            spend_distribution: Vec::new(),
        }
    }

    fn generator(backend: Arc<ScriptedBackend>) -> InsightGenerator {
        let caller = StructuredCaller::new(backend, Arc::new(AuditLog::new()));
        InsightGenerator::new(&config(), &PromptLibrary::default(), caller)
    }

    #[tokio::test]
    async fn test_wrapped_document_and_missing_ids() {
        let backend = Arc::new(ScriptedBackend::new([r#"{"hypotheses": [
            {"issue": "CTR fell on mobile", "segments": ["platform:mobile"], "metrics_involved": ["ctr"]},
            {"id": "X9", "claim": "ROAS fell", "metrics_involved": ["roas"]}
        ]}"#]));
        let hypotheses = generator(backend.clone()).generate(&summary(), "q").await.unwrap();

        assert_eq!(hypotheses.len(), 2);
        assert_eq!(hypotheses[0].id, "H1");
        assert_eq!(hypotheses[0].segments, vec!["platform:mobile"]);
        assert_eq!(hypotheses[1].id, "X9");
        assert_eq!(hypotheses[1].issue, "ROAS fell");
        assert_eq!(backend.temperatures(), vec![0.25]);
        assert!(backend.prompts()[0].contains("### METRIC SUMMARY"));
    }

    #[tokio::test]
    async fn test_fallback_list_after_two_invalid_responses() {
        let backend = Arc::new(ScriptedBackend::always_invalid());
        let hypotheses = generator(backend.clone()).generate(&summary(), "q").await.unwrap();

        assert_eq!(hypotheses, fallback_hypotheses());
        assert_eq!(hypotheses[0].issue, "Low CTR");
        assert_eq!(hypotheses[1].reason, "Weak targeting");
        assert_eq!(backend.calls(), 2);
    }
}
