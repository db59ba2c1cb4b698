//! Hypothesis evaluation
//!
//! For each hypothesis the evaluator builds numeric evidence (current
//! window vs. the period before it) and asks the model for a verdict.

use crate::agents::insight::Hypothesis;
use crate::agents::structured::{AgentKind, RecoveryPolicy, StructuredCaller};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::executor::AnalysisWindow;
use crate::metrics::{safe_ratio, Metric};
use crate::prompts::{assemble, PromptLibrary};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Validated,
    PartiallyValidated,
    Rejected,
}

/// Final judgement on one hypothesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub hypothesis: Hypothesis,
    pub status: ValidationStatus,
    pub confidence: f64,
    pub explanation: String,
    pub next_steps: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Verdict {
    status: ValidationStatus,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    next_steps: Vec<String>,
}

/// Current vs. prior-period value of one metric.
#[derive(Debug, Clone, PartialEq)]
pub struct EvidenceRecord {
    pub metric: Metric,
    pub window_days: u32,
    pub current: f64,
    pub comparison: f64,
    pub delta_pct: f64,
    pub significant_drop: bool,
    pub current_rows: usize,
    pub comparison_rows: usize,
}

impl EvidenceRecord {
    /// Compare the segment-filtered current window with every row of the
    /// full history dated before the current window's first day.
    ///
    /// Uses the first recognised entry of `metrics_involved`; returns `None`
    /// when none is recognised.
    pub fn build(window: &AnalysisWindow, hypothesis: &Hypothesis) -> Result<Option<Self>> {
        let Some(metric) = hypothesis
            .metrics_involved
            .iter()
            .find_map(|name| Metric::parse(name))
        else {
            return Ok(None);
        };

        let current = window.current.filter_segments(&hypothesis.segments)?;
        let comparison = match current.min_date()? {
            Some(start) => window.history.before(start)?,
            None => window.history.empty_like(),
        };

        let current_value = metric.value(&current.totals()?);
        let comparison_value = metric.value(&comparison.totals()?);
        let delta_pct = if comparison_value == 0.0 {
            0.0
        } else {
            safe_ratio(current_value - comparison_value, Some(comparison_value)) * 100.0
        };

        Ok(Some(Self {
            metric,
            window_days: window.days,
            current: current_value,
            comparison: comparison_value,
            delta_pct,
            significant_drop: current_value < comparison_value,
            current_rows: current.height(),
            comparison_rows: comparison.height(),
        }))
    }

    pub fn to_json(&self) -> Value {
        let name = self.metric.name();
        let mut evidence = Map::new();
        evidence.insert("metric".to_string(), json!(name));
        evidence.insert(
            format!("{}_last_{}_days", name, self.window_days),
            json!(self.current),
        );
        evidence.insert(format!("{}_prior_period", name), json!(self.comparison));
        evidence.insert("delta_pct".to_string(), json!(self.delta_pct));
        evidence.insert("significant_drop".to_string(), json!(self.significant_drop));
        evidence.insert("current_rows".to_string(), json!(self.current_rows));
        evidence.insert("comparison_rows".to_string(), json!(self.comparison_rows));
        Value::Object(evidence)
    }
}

/// Evidence object for a hypothesis; `{}` when no recognised metric is named.
pub fn evidence_for(window: &AnalysisWindow, hypothesis: &Hypothesis) -> Result<Value> {
    Ok(EvidenceRecord::build(window, hypothesis)?
        .map(|record| record.to_json())
        .unwrap_or_else(|| Value::Object(Map::new())))
}

pub struct Evaluator {
    caller: StructuredCaller,
    template: String,
    temperature: f32,
}

impl Evaluator {
    pub fn new(config: &PipelineConfig, prompts: &PromptLibrary, caller: StructuredCaller) -> Self {
        Self {
            caller,
            template: prompts.evaluator.clone(),
            temperature: config.llm.temperatures.evaluator,
        }
    }

    /// One verdict per hypothesis, in order. Malformed verdicts are fatal.
    pub async fn evaluate(
        &self,
        window: &AnalysisWindow,
        hypotheses: &[Hypothesis],
    ) -> Result<Vec<ValidationResult>> {
        let mut results = Vec::with_capacity(hypotheses.len());

        for hypothesis in hypotheses {
            let evidence = evidence_for(window, hypothesis)?;
            debug!("Evidence for {}: {}", hypothesis.id, evidence);

            let prompt = assemble(
                &self.template,
                AgentKind::Evaluator.name(),
                &[
                    ("HYPOTHESIS", serde_json::to_string_pretty(hypothesis)?),
                    ("EVIDENCE", serde_json::to_string_pretty(&evidence)?),
                ],
            );

            let verdict: Verdict = self
                .caller
                .produce(
                    AgentKind::Evaluator,
                    &prompt,
                    self.temperature,
                    RecoveryPolicy::Propagate,
                )
                .await?;

            let confidence = if verdict.confidence.is_finite() {
                verdict.confidence.clamp(0.0, 1.0)
            } else {
                0.0
            };

            results.push(ValidationResult {
                hypothesis: hypothesis.clone(),
                status: verdict.status,
                confidence,
                explanation: verdict.explanation,
                next_steps: verdict.next_steps,
            });
        }

        info!("🔎 {} hypotheses evaluated", results.len());
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use crate::dataset::Dataset;
    use crate::error::PipelineError;
    use crate::llm::ScriptedBackend;
    use polars::prelude::*;
    use std::sync::Arc;

    fn window() -> AnalysisWindow {
        // Two prior days with CTR 5%, two current days with CTR 2.5%.
        let frame = df![
            "date" => ["2024-06-01", "2024-06-02", "2024-06-03", "2024-06-04", "2024-06-04"],
            "campaign_name" => ["A", "A", "A", "A", "B"],
            "impressions" => [1000i64, 1000, 1000, 1000, 0],
            "clicks" => [50i64, 50, 25, 25, 0],
            "spend" => [10.0, 10.0, 10.0, 10.0, 0.0],
            "revenue" => [30.0, 30.0, 40.0, 40.0, 0.0]
        ]
        .unwrap();
        AnalysisWindow::new(Dataset::from_frame(frame).unwrap(), 2).unwrap()
    }

    fn config() -> PipelineConfig {
        PipelineConfig::from_json(
            r#"{
                "data": {"use_sample_data": true, "sample_path": "a.csv", "full_path": "b.csv", "min_impressions": 0},
                "thresholds": {"low_ctr": 0.01}
            }"#,
        )
        .unwrap()
    }

    fn evaluator(backend: Arc<ScriptedBackend>) -> Evaluator {
        let caller = StructuredCaller::new(backend, Arc::new(AuditLog::new()));
        Evaluator::new(&config(), &PromptLibrary::default(), caller)
    }

    #[test]
    fn test_ctr_evidence_against_prior_period() {
        let hypothesis = Hypothesis::new("H1", "CTR fell", "fatigue", &["CTR", "roas"]);
        let record = EvidenceRecord::build(&window(), &hypothesis).unwrap().unwrap();

        assert_eq!(record.metric, Metric::Ctr);
        assert!((record.current - 0.025).abs() < 1e-12);
        assert!((record.comparison - 0.05).abs() < 1e-12);
        assert!((record.delta_pct + 50.0).abs() < 1e-9);
        assert!(record.significant_drop);
        assert_eq!(record.current_rows, 3);
        assert_eq!(record.comparison_rows, 2);

        let json = record.to_json();
        assert!(json.get("ctr_last_2_days").is_some());
        assert!(json.get("ctr_prior_period").is_some());
        assert_eq!(json["significant_drop"], true);
    }

    #[test]
    fn test_roas_improvement_is_not_a_drop() {
        let hypothesis = Hypothesis::new("H2", "ROAS fell", "targeting", &["roas"]);
        let record = EvidenceRecord::build(&window(), &hypothesis).unwrap().unwrap();
        assert!((record.current - 4.0).abs() < 1e-12);
        assert!((record.comparison - 3.0).abs() < 1e-12);
        assert!(!record.significant_drop);
    }

    #[test]
    fn test_segment_filter_moves_comparison_start() {
        // Only B's single current day; prior period is everything before 06-04.
        let hypothesis =
            Hypothesis::new("H3", "B is weak", "n/a", &["ctr"]).with_segments(&["campaign_name:B"]);
        let record = EvidenceRecord::build(&window(), &hypothesis).unwrap().unwrap();
        assert_eq!(record.current_rows, 1);
        assert_eq!(record.comparison_rows, 3);
        assert_eq!(record.current, 0.0);
    }

    #[test]
    fn test_unknown_metric_gives_empty_evidence() {
        let window = window();
        let unknown = Hypothesis::new("H4", "CPM rose", "auction", &["cpm"]);
        assert_eq!(evidence_for(&window, &unknown).unwrap(), json!({}));

        let none = Hypothesis::new("H5", "Something", "?", &[]);
        assert_eq!(evidence_for(&window, &none).unwrap(), json!({}));
    }

    #[test]
    fn test_first_recognised_metric_is_used() {
        let hypothesis = Hypothesis::new("H6", "CTR fell", "fatigue", &["cpm", "ctr"]);
        let record = EvidenceRecord::build(&window(), &hypothesis).unwrap().unwrap();
        assert_eq!(record.metric, Metric::Ctr);

        let evidence = evidence_for(&window(), &hypothesis).unwrap();
        assert_eq!(evidence["metric"], "ctr");
    }

    #[tokio::test]
    async fn test_empty_evidence_still_evaluated() {
        let backend = Arc::new(ScriptedBackend::new([
            r#"{"status": "rejected", "confidence": 0.2, "explanation": "no data"}"#,
        ]));
        let hypotheses = vec![Hypothesis::new("H4", "CPM rose", "auction", &["cpm"])];

        let results = evaluator(backend.clone())
            .evaluate(&window(), &hypotheses)
            .await
            .unwrap();

        assert_eq!(backend.calls(), 1);
        assert!(backend.prompts()[0].contains("### EVIDENCE\n{}"));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].hypothesis.id, "H4");
        assert_eq!(results[0].status, ValidationStatus::Rejected);
    }

    #[tokio::test]
    async fn test_verdicts_in_order_with_clamped_confidence() {
        let backend = Arc::new(ScriptedBackend::new([
            r#"{"status": "validated", "confidence": 1.7, "explanation": "down", "next_steps": ["refresh"]}"#,
            r#"{"status": "rejected", "confidence": -2}"#,
        ]));
        let hypotheses = vec![
            Hypothesis::new("H1", "CTR fell", "fatigue", &["ctr"]),
            Hypothesis::new("H2", "ROAS fell", "targeting", &["roas"]),
        ];

        let results = evaluator(backend.clone())
            .evaluate(&window(), &hypotheses)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].status, ValidationStatus::Validated);
        assert_eq!(results[0].confidence, 1.0);
        assert_eq!(results[0].hypothesis.id, "H1");
        assert_eq!(results[1].status, ValidationStatus::Rejected);
        assert_eq!(results[1].confidence, 0.0);
        assert_eq!(backend.calls(), 2);
        assert_eq!(backend.temperatures(), vec![0.0, 0.0]);
        assert!(backend.prompts()[0].contains("ctr_last_2_days"));
    }

    #[tokio::test]
    async fn test_no_hypotheses_no_calls() {
        let backend = Arc::new(ScriptedBackend::always_invalid());
        let results = evaluator(backend.clone()).evaluate(&window(), &[]).await.unwrap();
        assert!(results.is_empty());
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_verdict_is_fatal_after_repair() {
        let backend = Arc::new(ScriptedBackend::always_invalid());
        let hypotheses = vec![Hypothesis::new("H1", "CTR fell", "fatigue", &["ctr"])];

        let err = evaluator(backend.clone())
            .evaluate(&window(), &hypotheses)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::MalformedOutput { .. }));
        assert_eq!(backend.calls(), 2);
    }
}
