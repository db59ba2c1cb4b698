//! Plan Step Executor
//!
//! Walks a plan once, in order, dispatching each step to one agent and
//! threading results forward through a [`ResultBundle`]. Steps whose input
//! is not available yet, steps whose slot is already filled, and steps with
//! unknown identifiers are skipped rather than failing the run.

use crate::agents::{
    CreativeGenerator, CreativeIdea, Evaluator, Hypothesis, InsightGenerator, ValidationResult,
};
use crate::audit::AuditLog;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::metrics::{MetricsProvider, MetricsSummary};
use crate::plan::{LogicalAction, Plan, Step};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

/// The dataset handle a run works on.
#[derive(Debug, Clone)]
pub struct AnalysisWindow {
    /// Every loaded row.
    pub history: Dataset,
    /// Rows from the last `days` days of `history`.
    pub current: Dataset,
    pub days: u32,
}

impl AnalysisWindow {
    pub fn new(history: Dataset, days: u32) -> Result<Self> {
        let current = history.last_n_days(days)?;
        Ok(Self {
            history,
            current,
            days,
        })
    }
}

/// Output of one run. Each slot is set at most once.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultBundle {
    pub summary: Option<MetricsSummary>,
    pub hypotheses: Option<Vec<Hypothesis>>,
    pub evaluated: Option<Vec<ValidationResult>>,
    pub creatives: Option<Vec<CreativeIdea>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipReason {
    UnknownAction,
    MissingSummary,
    MissingHypotheses,
    AlreadySet,
}

impl SkipReason {
    fn as_str(&self) -> &'static str {
        match self {
            SkipReason::UnknownAction => "unknown_action",
            SkipReason::MissingSummary => "missing_summary",
            SkipReason::MissingHypotheses => "missing_hypotheses",
            SkipReason::AlreadySet => "already_set",
        }
    }
}

pub struct PlanStepExecutor<'a> {
    metrics: &'a dyn MetricsProvider,
    insight: &'a InsightGenerator,
    evaluator: &'a Evaluator,
    creative: &'a CreativeGenerator,
    audit: Arc<AuditLog>,
}

impl<'a> PlanStepExecutor<'a> {
    pub fn new(
        metrics: &'a dyn MetricsProvider,
        insight: &'a InsightGenerator,
        evaluator: &'a Evaluator,
        creative: &'a CreativeGenerator,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            metrics,
            insight,
            evaluator,
            creative,
            audit,
        }
    }

    /// Run every step of `plan` against `window`.
    ///
    /// Only agent errors abort the run; skipped steps leave their slot empty.
    pub async fn execute(
        &self,
        plan: &Plan,
        query: &str,
        window: &AnalysisWindow,
    ) -> Result<ResultBundle> {
        let mut bundle = ResultBundle::default();

        for (index, step) in plan.steps().iter().enumerate() {
            match self.dispatch(step, query, window, &mut bundle).await? {
                Ok(action) => {
                    debug!("Step {} ({}) dispatched as {}", index, step.label(), action);
                    self.audit.record(
                        "step_dispatched",
                        json!({ "index": index, "step": step, "action": action.as_str() }),
                    );
                }
                Err(reason) => {
                    info!("⏭️  Skipping step {} ({}): {}", index, step.label(), reason.as_str());
                    self.audit.record(
                        "step_skipped",
                        json!({ "index": index, "step": step, "reason": reason.as_str() }),
                    );
                }
            }
        }

        Ok(bundle)
    }

    /// Outer `Result` carries agent failures; inner one says whether the
    /// step ran.
    async fn dispatch(
        &self,
        step: &Step,
        query: &str,
        window: &AnalysisWindow,
        bundle: &mut ResultBundle,
    ) -> Result<std::result::Result<LogicalAction, SkipReason>> {
        let Some(action) = step.logical_action() else {
            return Ok(Err(SkipReason::UnknownAction));
        };

        match action {
            LogicalAction::LoadData => {
                if bundle.summary.is_some() {
                    return Ok(Err(SkipReason::AlreadySet));
                }
                bundle.summary = Some(self.metrics.summarize(&window.history, window.days)?);
            }
            LogicalAction::AnalyzeMetrics => {
                if bundle.summary.is_none() {
                    bundle.summary = Some(self.metrics.summarize(&window.history, window.days)?);
                }
            }
            LogicalAction::GenerateInsights => {
                if bundle.hypotheses.is_some() {
                    return Ok(Err(SkipReason::AlreadySet));
                }
                let Some(summary) = bundle.summary.as_ref() else {
                    return Ok(Err(SkipReason::MissingSummary));
                };
                let hypotheses = self.insight.generate(summary, query).await?;
                bundle.hypotheses = Some(hypotheses);
            }
            LogicalAction::EvaluateInsights => {
                if bundle.evaluated.is_some() {
                    return Ok(Err(SkipReason::AlreadySet));
                }
                let Some(hypotheses) = bundle.hypotheses.as_ref() else {
                    return Ok(Err(SkipReason::MissingHypotheses));
                };
                let evaluated = self.evaluator.evaluate(window, hypotheses).await?;
                bundle.evaluated = Some(evaluated);
            }
            LogicalAction::ProduceCreatives => {
                if bundle.creatives.is_some() {
                    return Ok(Err(SkipReason::AlreadySet));
                }
                bundle.creatives = Some(self.creative.generate(window).await?);
            }
        }

        Ok(Ok(action))
    }
}
