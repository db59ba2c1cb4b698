//! Pipeline configuration
//!
//! One JSON document, loaded once at startup and handed to every component
//! constructor by reference. Environment variables (after `.env` is loaded)
//! override the LLM settings.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub data: DataConfig,
    pub thresholds: Thresholds,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub reports: ReportsConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub use_sample_data: bool,
    pub sample_path: PathBuf,
    pub full_path: PathBuf,
    /// Campaigns with fewer impressions are left out of the per-campaign rollup.
    pub min_impressions: f64,
    #[serde(default = "default_window_days")]
    pub window_days: u32,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl DataConfig {
    /// Path of the dataset selected by `use_sample_data`.
    pub fn dataset_path(&self) -> &Path {
        if self.use_sample_data {
            &self.sample_path
        } else {
            &self.full_path
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thresholds {
    /// Campaigns whose aggregate CTR sits below this are creative-refresh candidates.
    pub low_ctr: f64,
    #[serde(default = "default_max_low_performers")]
    pub max_low_performers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub temperatures: Temperatures,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            temperatures: Temperatures::default(),
        }
    }
}

/// Sampling temperature per agent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Temperatures {
    #[serde(default = "default_planner_temperature")]
    pub planner: f32,
    #[serde(default = "default_insight_temperature")]
    pub insight: f32,
    #[serde(default)]
    pub evaluator: f32,
    #[serde(default = "default_creative_temperature")]
    pub creative: f32,
}

impl Default for Temperatures {
    fn default() -> Self {
        Self {
            planner: default_planner_temperature(),
            insight: default_insight_temperature(),
            evaluator: 0.0,
            creative: default_creative_temperature(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for the JSONL audit trail. No file is written when unset.
    #[serde(default)]
    pub logs_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportsConfig {
    #[serde(default = "default_reports_dir")]
    pub dir: PathBuf,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            dir: default_reports_dir(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptsConfig {
    /// Directory holding `<agent>.md` overrides for the built-in templates.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_window_days() -> u32 {
    7
}

fn default_top_n() -> usize {
    5
}

fn default_max_low_performers() -> usize {
    5
}

fn default_model() -> String {
    "gpt-4.1".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_planner_temperature() -> f32 {
    0.1
}

fn default_insight_temperature() -> f32 {
    0.3
}

fn default_creative_temperature() -> f32 {
    0.7
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from("reports")
}

impl PipelineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
            .map_err(|e| PipelineError::Config(format!("{} ({})", e, path.display())))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(content)
            .map_err(|e| PipelineError::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `OPENAI_MODEL` / `OPENAI_BASE_URL` from the environment.
    pub fn apply_env(&mut self) {
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            if !model.trim().is_empty() {
                self.llm.model = model;
            }
        }
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            if !base_url.trim().is_empty() {
                self.llm.base_url = base_url;
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.data.window_days == 0 {
            return Err(PipelineError::Config(
                "data.window_days must be at least 1".to_string(),
            ));
        }
        if !self.thresholds.low_ctr.is_finite() || self.thresholds.low_ctr < 0.0 {
            return Err(PipelineError::Config(format!(
                "thresholds.low_ctr must be a non-negative number, got {}",
                self.thresholds.low_ctr
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "data": {
            "use_sample_data": true,
            "sample_path": "data/sample_ads.csv",
            "full_path": "data/ads.csv",
            "min_impressions": 100
        },
        "thresholds": { "low_ctr": 0.01 }
    }"#;

    #[test]
    fn test_defaults_fill_optional_sections() {
        let config = PipelineConfig::from_json(MINIMAL).unwrap();
        assert_eq!(config.data.window_days, 7);
        assert_eq!(config.data.top_n, 5);
        assert_eq!(config.thresholds.max_low_performers, 5);
        assert_eq!(config.llm.model, "gpt-4.1");
        assert_eq!(config.llm.temperatures.evaluator, 0.0);
        assert_eq!(config.reports.dir, PathBuf::from("reports"));
        assert!(config.logging.logs_dir.is_none());
        assert_eq!(config.data.dataset_path(), Path::new("data/sample_ads.csv"));
    }

    #[test]
    fn test_missing_required_key_is_fatal() {
        let without_threshold = r#"{
            "data": {
                "use_sample_data": true,
                "sample_path": "a.csv",
                "full_path": "b.csv",
                "min_impressions": 0
            }
        }"#;
        let err = PipelineConfig::from_json(without_threshold).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
        assert!(err.to_string().contains("thresholds"));
    }

    #[test]
    fn test_zero_window_rejected() {
        let content = MINIMAL.replace(r#""min_impressions": 100"#, r#""min_impressions": 100, "window_days": 0"#);
        assert!(PipelineConfig::from_json(&content).is_err());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = PipelineConfig::load("does/not/exist/config.json").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
