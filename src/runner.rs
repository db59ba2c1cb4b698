//! Pipeline Runner
//!
//! Top-level composition: query → plan → dataset → executor → bundle.

use crate::agents::{CreativeGenerator, Evaluator, InsightGenerator, Planner, StructuredCaller};
use crate::audit::AuditLog;
use crate::config::PipelineConfig;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::executor::{AnalysisWindow, PlanStepExecutor, ResultBundle};
use crate::llm::GenerativeBackend;
use crate::metrics::DataAgent;
use crate::plan::Plan;
use crate::prompts::PromptLibrary;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

pub struct PipelineRunner {
    config: PipelineConfig,
    audit: Arc<AuditLog>,
    planner: Planner,
    data_agent: DataAgent,
    insight: InsightGenerator,
    evaluator: Evaluator,
    creative: CreativeGenerator,
}

impl PipelineRunner {
    /// Build every agent from `config`. The audit log writes to
    /// `logging.logs_dir` when set.
    pub fn new(config: PipelineConfig, backend: Arc<dyn GenerativeBackend>) -> Result<Self> {
        let audit = match &config.logging.logs_dir {
            Some(dir) => AuditLog::with_dir(dir),
            None => AuditLog::new(),
        };
        Self::with_audit(config, backend, Arc::new(audit))
    }

    pub fn with_audit(
        config: PipelineConfig,
        backend: Arc<dyn GenerativeBackend>,
        audit: Arc<AuditLog>,
    ) -> Result<Self> {
        let prompts = PromptLibrary::load(config.prompts.dir.as_deref())?;
        let caller = StructuredCaller::new(backend, audit.clone());

        Ok(Self {
            planner: Planner::new(&config, &prompts, caller.clone()),
            data_agent: DataAgent::new(&config, audit.clone()),
            insight: InsightGenerator::new(&config, &prompts, caller.clone()),
            evaluator: Evaluator::new(&config, &prompts, caller.clone()),
            creative: CreativeGenerator::new(&config, &prompts, caller),
            config,
            audit,
        })
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Plan, load the configured dataset, and execute.
    pub async fn run(&self, query: &str) -> Result<ResultBundle> {
        self.start(query);
        let plan = self.planner.plan(query).await?;
        let dataset = Dataset::load(&self.config.data)?;
        self.execute(query, &plan, dataset).await
    }

    /// Like [`run`](Self::run), with an already loaded dataset.
    pub async fn run_with_dataset(&self, query: &str, dataset: Dataset) -> Result<ResultBundle> {
        self.start(query);
        let plan = self.planner.plan(query).await?;
        self.execute(query, &plan, dataset).await
    }

    fn start(&self, query: &str) {
        info!("🚀 Pipeline started (run {})", self.audit.run_id());
        self.audit
            .record("pipeline_started", json!({ "query": query }));
    }

    async fn execute(&self, query: &str, plan: &Plan, dataset: Dataset) -> Result<ResultBundle> {
        let window = AnalysisWindow::new(dataset, self.config.data.window_days)?;
        info!(
            "📅 {} of {} rows fall in the last {} days",
            window.current.height(),
            window.history.height(),
            window.days
        );

        let executor = PlanStepExecutor::new(
            &self.data_agent,
            &self.insight,
            &self.evaluator,
            &self.creative,
            self.audit.clone(),
        );
        let bundle = executor.execute(plan, query, &window).await?;

        self.audit.record(
            "pipeline_finished",
            json!({
                "summary": bundle.summary.is_some(),
                "hypotheses": bundle.hypotheses.as_ref().map(Vec::len),
                "evaluated": bundle.evaluated.as_ref().map(Vec::len),
                "creatives": bundle.creatives.as_ref().map(Vec::len),
            }),
        );
        info!("✅ Pipeline finished");
        Ok(bundle)
    }
}
