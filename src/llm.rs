use crate::config::LlmConfig;
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Text-completion capability behind every generative step.
///
/// No structured-output negotiation happens here: callers validate the text.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String>;
}

/// OpenAI-compatible chat completions client.
#[derive(Clone)]
pub struct LlmClient {
    api_key: String,
    base_url: String,
    model: String,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            api_key,
            base_url,
            model,
            http: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl GenerativeBackend for LlmClient {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "temperature": temperature,
        });

        debug!("Calling {} (model {}, temperature {})", self.base_url, self.model, temperature);

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::Llm(format!("LLM API call failed: {}", e)))?;

        // Check HTTP status
        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PipelineError::Llm(format!(
                "LLM API error ({}): {}",
                status, error_text
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PipelineError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        if let Some(error) = response_json.get("error") {
            return Err(PipelineError::Llm(format!("LLM API error: {}", error)));
        }

        let choices = response_json
            .get("choices")
            .and_then(|c| c.as_array())
            .ok_or_else(|| {
                PipelineError::Llm(format!(
                    "No choices array in LLM response. Response: {}",
                    response_json
                ))
            })?;

        let first = choices
            .first()
            .ok_or_else(|| PipelineError::Llm("Empty choices array in LLM response".to_string()))?;

        // A truncated answer is still returned; the caller's parser decides.
        match first.get("finish_reason").and_then(|r| r.as_str()) {
            Some("length") => warn!("⚠️  LLM response was truncated due to length limit"),
            Some("content_filter") => {
                return Err(PipelineError::Llm(
                    "LLM response was filtered by content policy".to_string(),
                ))
            }
            _ => {}
        }

        let content = first["message"]["content"].as_str().ok_or_else(|| {
            PipelineError::Llm(format!("No content in LLM response: {}", first))
        })?;

        if content.is_empty() {
            return Err(PipelineError::Llm("Empty content in LLM response".to_string()));
        }

        Ok(content.to_string())
    }
}

/// The real client when an API key is available, the offline stand-in otherwise.
pub fn select_backend(config: &LlmConfig, api_key: Option<String>) -> Arc<dyn GenerativeBackend> {
    match api_key.filter(|key| !key.trim().is_empty()) {
        Some(key) => {
            info!("🤖 Using LLM backend {} ({})", config.model, config.base_url);
            Arc::new(LlmClient::new(key, config.model.clone(), config.base_url.clone()))
        }
        None => {
            warn!("⚠️  No OPENAI_API_KEY set, using the offline backend");
            Arc::new(OfflineBackend::new())
        }
    }
}

/// Deterministic stand-in used when no API key is configured.
///
/// Prompts carry a `## Agent: <name>` header; each agent gets a canned,
/// well-formed answer so the whole pipeline can run without a network.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineBackend;

impl OfflineBackend {
    pub fn new() -> Self {
        Self
    }

    fn respond(&self, prompt: &str) -> String {
        let agent = prompt
            .lines()
            .find_map(|line| line.trim().strip_prefix("## Agent:"))
            .map(str::trim)
            .unwrap_or("");

        match agent {
            "planner" => r#"{"steps": ["load_data", "analyze_metrics", "generate_insights", "evaluate_insights", "produce_creatives"]}"#.to_string(),
            "insight_agent" => r#"[
  {"id": "H1", "issue": "CTR declined in the latest week", "reason": "Creative fatigue on long-running ads", "segments": [], "metrics_involved": ["ctr"]},
  {"id": "H2", "issue": "ROAS dropped versus the prior period", "reason": "Spend shifted toward weaker audiences", "segments": [], "metrics_involved": ["roas"]}
]"#
            .to_string(),
            "evaluator" => {
                let (status, confidence, explanation) = if prompt.contains("\"significant_drop\": true") {
                    ("validated", 0.75, "The metric is lower in the current window than in the prior period.")
                } else if prompt.contains("\"significant_drop\": false") {
                    ("rejected", 0.6, "The metric did not decline against the prior period.")
                } else {
                    ("partially_validated", 0.4, "No numeric evidence was available for this metric.")
                };
                serde_json::json!({
                    "status": status,
                    "confidence": confidence,
                    "explanation": explanation,
                    "next_steps": ["Monitor the metric daily", "Break the result down by adset"],
                })
                .to_string()
            }
            "creative_generator" => r#"[
  {"headline": "Save big this week", "message": "Use a bold headline highlighting the discount", "call_to_action": "Shop Now", "rationale": "Clear value proposition"},
  {"headline": "Made to stand out", "message": "Try bright background colors", "call_to_action": "Learn More", "rationale": "Higher thumb-stop rate"},
  {"headline": "Loved by thousands", "message": "Add social proof testimonials", "call_to_action": "See Reviews", "rationale": "Trust drives clicks"}
]"#
            .to_string(),
            _ => "offline backend has no canned answer for this prompt".to_string(),
        }
    }
}

#[async_trait]
impl GenerativeBackend for OfflineBackend {
    async fn complete(&self, prompt: &str, _temperature: f32) -> Result<String> {
        Ok(self.respond(prompt))
    }
}

/// Replays queued responses in order; the last one repeats once the queue
/// runs dry. Records every prompt it receives.
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<String>>,
    last: Mutex<String>,
    prompts: Mutex<Vec<(String, f32)>>,
}

impl ScriptedBackend {
    pub fn new<S: Into<String>>(responses: impl IntoIterator<Item = S>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            last: Mutex::new(String::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// A backend that never produces parseable output.
    pub fn always_invalid() -> Self {
        Self::new(["this is not JSON at all"])
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.iter().map(|(prompt, _)| prompt.clone()).collect())
            .unwrap_or_default()
    }

    pub fn temperatures(&self) -> Vec<f32> {
        self.prompts
            .lock()
            .map(|p| p.iter().map(|(_, t)| *t).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl GenerativeBackend for ScriptedBackend {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String> {
        self.prompts
            .lock()
            .map_err(|_| PipelineError::Llm("scripted backend poisoned".to_string()))?
            .push((prompt.to_string(), temperature));

        let next = self
            .responses
            .lock()
            .map_err(|_| PipelineError::Llm("scripted backend poisoned".to_string()))?
            .pop_front();

        let mut last = self
            .last
            .lock()
            .map_err(|_| PipelineError::Llm("scripted backend poisoned".to_string()))?;
        if let Some(next) = next {
            *last = next;
        }
        Ok(last.clone())
    }
}
