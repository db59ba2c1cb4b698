//! Structured generative calls with a single repair attempt.
//!
//! `produce` makes at most two backend calls. The first response is parsed;
//! if that fails, the prompt is re-sent with a repair instruction. If the
//! second response also fails to parse, the caller's [`RecoveryPolicy`]
//! decides between a fixed fallback value and a fatal error.

use crate::audit::AuditLog;
use crate::error::{PipelineError, Result};
use crate::llm::GenerativeBackend;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    Planner,
    Insight,
    Evaluator,
    Creative,
}

impl AgentKind {
    /// Name used in prompt headers and audit event types.
    pub fn name(&self) -> &'static str {
        match self {
            AgentKind::Planner => "planner",
            AgentKind::Insight => "insight_agent",
            AgentKind::Evaluator => "evaluator",
            AgentKind::Creative => "creative_generator",
        }
    }

    fn expected_document(&self) -> &'static str {
        match self {
            AgentKind::Planner | AgentKind::Evaluator => "JSON object",
            AgentKind::Insight | AgentKind::Creative => "JSON array",
        }
    }
}

/// What to do when the repaired response still does not parse.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryPolicy<T> {
    UseFallback(T),
    Propagate,
}

#[derive(Clone)]
pub struct StructuredCaller {
    backend: Arc<dyn GenerativeBackend>,
    audit: Arc<AuditLog>,
}

impl StructuredCaller {
    pub fn new(backend: Arc<dyn GenerativeBackend>, audit: Arc<AuditLog>) -> Self {
        Self { backend, audit }
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub async fn produce<T: DeserializeOwned + Serialize>(
        &self,
        agent: AgentKind,
        prompt: &str,
        temperature: f32,
        policy: RecoveryPolicy<T>,
    ) -> Result<T> {
        let name = agent.name();

        self.audit.record(
            &format!("{}_prompt_sent", name),
            json!({ "prompt": prompt, "temperature": temperature }),
        );
        let raw = self.backend.complete(prompt, temperature).await?;
        self.audit
            .record(&format!("{}_raw_response", name), json!({ "raw": raw, "attempt": 1 }));

        let first_error = match parse_structured::<T>(&raw) {
            Ok(value) => {
                self.audit
                    .record(&format!("{}_parsed", name), parsed_payload(1, &value));
                return Ok(value);
            }
            Err(e) => e,
        };

        warn!("⚠️  {} returned invalid output, requesting repair: {}", name, first_error);
        let repair = repair_prompt(prompt, agent, &first_error);
        self.audit.record(
            &format!("{}_repair_prompt_sent", name),
            json!({ "error": first_error }),
        );
        let raw = self.backend.complete(&repair, temperature).await?;
        self.audit
            .record(&format!("{}_raw_response", name), json!({ "raw": raw, "attempt": 2 }));

        match parse_structured::<T>(&raw) {
            Ok(value) => {
                info!("✅ {} output repaired on second attempt", name);
                self.audit
                    .record(&format!("{}_parsed", name), parsed_payload(2, &value));
                Ok(value)
            }
            Err(second_error) => match policy {
                RecoveryPolicy::UseFallback(fallback) => {
                    warn!("⚠️  {} output still invalid, using fallback: {}", name, second_error);
                    self.audit.record(
                        &format!("{}_fallback_used", name),
                        json!({ "error": second_error, "result": to_payload(&fallback) }),
                    );
                    Ok(fallback)
                }
                RecoveryPolicy::Propagate => Err(PipelineError::MalformedOutput {
                    agent: name.to_string(),
                    detail: second_error,
                }),
            },
        }
    }
}

fn to_payload<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn parsed_payload<T: Serialize>(attempt: u8, value: &T) -> Value {
    json!({ "attempt": attempt, "result": to_payload(value) })
}

fn repair_prompt(prompt: &str, agent: AgentKind, error: &str) -> String {
    format!(
        "{}\n\n### REPAIR\nYour previous response was not valid JSON for this task ({}).\nRespond again with ONLY a strictly valid {} and nothing else: no markdown fences, no commentary.",
        prompt,
        error,
        agent.expected_document()
    )
}

/// Parse model text into `T`, tolerating a surrounding markdown code fence.
pub fn parse_structured<T: DeserializeOwned>(raw: &str) -> std::result::Result<T, String> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Err("empty response".to_string());
    }
    serde_json::from_str::<T>(body).map_err(|e| {
        debug!("Unparseable response body: {}", body);
        e.to_string()
    })
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    if let Ok(re) = regex::Regex::new(r"(?s)^```[A-Za-z0-9_-]*\s*(.*?)\s*```$") {
        if let Some(body) = re.captures(trimmed).and_then(|c| c.get(1)) {
            return body.as_str();
        }
    }
    trimmed
}
