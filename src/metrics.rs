//! Metrics provider
//!
//! Turns the current data window into the numeric summary the insight agent
//! reasons over: daily ROAS trend, per-campaign rollups, top/bottom rankings
//! and spend share.

use crate::audit::AuditLog;
use crate::config::PipelineConfig;
use crate::dataset::{Dataset, Totals};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::info;

/// `a / b`, or 0 when the denominator is missing, zero, or not a number.
pub fn safe_ratio(numerator: f64, denominator: Option<f64>) -> f64 {
    match denominator {
        Some(d) if d != 0.0 && !d.is_nan() => numerator / d,
        _ => 0.0,
    }
}

pub fn ctr(totals: &Totals) -> f64 {
    safe_ratio(totals.clicks, Some(totals.impressions))
}

pub fn roas(totals: &Totals) -> f64 {
    safe_ratio(totals.revenue, Some(totals.spend))
}

/// Ratio metrics hypotheses can be checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Ctr,
    Roas,
}

impl Metric {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "ctr" => Some(Metric::Ctr),
            "roas" => Some(Metric::Roas),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Metric::Ctr => "ctr",
            Metric::Roas => "roas",
        }
    }

    /// Ratio of sums over `totals`.
    pub fn value(&self, totals: &Totals) -> f64 {
        match self {
            Metric::Ctr => ctr(totals),
            Metric::Roas => roas(totals),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRoas {
    pub date: String,
    pub spend: f64,
    pub revenue: f64,
    pub roas: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignPerformance {
    pub campaign_name: String,
    pub impressions: f64,
    pub clicks: f64,
    pub spend: f64,
    pub revenue: f64,
    pub ctr: f64,
    pub roas: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpendShare {
    pub campaign_name: String,
    pub spend: f64,
    pub share_pct: f64,
}

/// Numeric snapshot of the current window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub window_days: u32,
    pub rows: usize,
    pub roas_trend: Vec<DailyRoas>,
    pub campaign_performance: Vec<CampaignPerformance>,
    pub top_campaigns: Vec<CampaignPerformance>,
    pub bottom_campaigns: Vec<CampaignPerformance>,
    pub spend_distribution: Vec<SpendShare>,
}

pub trait MetricsProvider: Send + Sync {
    fn summarize(&self, dataset: &Dataset, window_days: u32) -> Result<MetricsSummary>;
}

/// Default metrics provider backed by the polars dataset.
pub struct DataAgent {
    min_impressions: f64,
    top_n: usize,
    audit: Arc<AuditLog>,
}

impl DataAgent {
    pub fn new(config: &PipelineConfig, audit: Arc<AuditLog>) -> Self {
        Self {
            min_impressions: config.data.min_impressions,
            top_n: config.data.top_n,
            audit,
        }
    }

    /// Per-campaign totals with CTR and ROAS, before the impressions floor.
    pub fn campaign_rollup(dataset: &Dataset) -> Result<Vec<CampaignPerformance>> {
        Ok(dataset
            .rollup_by("campaign_name")?
            .into_iter()
            .map(|group| CampaignPerformance {
                ctr: ctr(&group.totals),
                roas: roas(&group.totals),
                campaign_name: group.key,
                impressions: group.totals.impressions,
                clicks: group.totals.clicks,
                spend: group.totals.spend,
                revenue: group.totals.revenue,
            })
            .collect())
    }

    fn roas_trend(dataset: &Dataset) -> Result<Vec<DailyRoas>> {
        Ok(dataset
            .rollup_by("date")?
            .into_iter()
            .map(|group| DailyRoas {
                roas: roas(&group.totals),
                date: group.key,
                spend: group.totals.spend,
                revenue: group.totals.revenue,
            })
            .collect())
    }

    fn spend_distribution(campaigns: &[CampaignPerformance]) -> Vec<SpendShare> {
        let total: f64 = campaigns.iter().map(|c| c.spend).sum();
        campaigns
            .iter()
            .map(|c| SpendShare {
                campaign_name: c.campaign_name.clone(),
                spend: c.spend,
                share_pct: if total > 0.0 { c.spend / total * 100.0 } else { 0.0 },
            })
            .collect()
    }
}

fn by_roas(a: &CampaignPerformance, b: &CampaignPerformance) -> Ordering {
    a.roas.partial_cmp(&b.roas).unwrap_or(Ordering::Equal)
}

impl MetricsProvider for DataAgent {
    fn summarize(&self, dataset: &Dataset, window_days: u32) -> Result<MetricsSummary> {
        let window = dataset.last_n_days(window_days)?;
        self.audit.record("data_loaded", json!({ "rows": window.height() }));

        let all_campaigns = Self::campaign_rollup(&window)?;
        let spend_distribution = Self::spend_distribution(&all_campaigns);

        let campaign_performance: Vec<CampaignPerformance> = all_campaigns
            .into_iter()
            .filter(|c| c.impressions >= self.min_impressions)
            .collect();

        let mut ranked = campaign_performance.clone();
        ranked.sort_by(|a, b| by_roas(b, a));
        let top_campaigns: Vec<_> = ranked.iter().take(self.top_n).cloned().collect();
        ranked.sort_by(by_roas);
        let bottom_campaigns: Vec<_> = ranked.iter().take(self.top_n).cloned().collect();

        let summary = MetricsSummary {
            window_days,
            rows: window.height(),
            roas_trend: Self::roas_trend(&window)?,
            campaign_performance,
            top_campaigns,
            bottom_campaigns,
            spend_distribution,
        };

        info!(
            "📈 Summary ready: {} rows, {} campaigns over {} days",
            summary.rows,
            summary.campaign_performance.len(),
            window_days
        );
        self.audit.record(
            "data_summary_ready",
            json!({
                "summary_keys": [
                    "roas_trend",
                    "campaign_performance",
                    "top_campaigns",
                    "bottom_campaigns",
                    "spend_distribution"
                ]
            }),
        );

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use polars::prelude::*;

    fn config(min_impressions: f64, top_n: usize) -> PipelineConfig {
        PipelineConfig::from_json(&format!(
            r#"{{
                "data": {{
                    "use_sample_data": true,
                    "sample_path": "x.csv",
                    "full_path": "y.csv",
                    "min_impressions": {},
                    "top_n": {}
                }},
                "thresholds": {{ "low_ctr": 0.01 }}
            }}"#,
            min_impressions, top_n
        ))
        .unwrap()
    }

    fn dataset() -> Dataset {
        let frame = df![
            "date" => ["2024-05-01", "2024-05-01", "2024-05-02", "2024-05-02", "2024-05-02"],
            "campaign_name" => ["A", "B", "A", "B", "C"],
            "impressions" => [1000i64, 200, 1000, 200, 50],
            "clicks" => [20i64, 2, 30, 4, 1],
            "spend" => [50.0, 10.0, 50.0, 10.0, 0.0],
            "revenue" => [150.0, 10.0, 250.0, 30.0, 0.0]
        ]
        .unwrap();
        Dataset::from_frame(frame).unwrap()
    }

    #[test]
    fn test_safe_ratio() {
        assert_eq!(safe_ratio(5.0, Some(0.0)), 0.0);
        assert_eq!(safe_ratio(5.0, None), 0.0);
        assert_eq!(safe_ratio(5.0, Some(f64::NAN)), 0.0);
        assert_eq!(safe_ratio(5.0, Some(2.0)), 2.5);
        assert_eq!(safe_ratio(0.0, Some(4.0)), 0.0);
    }

    #[test]
    fn test_metric_names() {
        assert_eq!(Metric::parse(" CTR "), Some(Metric::Ctr));
        assert_eq!(Metric::parse("roas"), Some(Metric::Roas));
        assert_eq!(Metric::parse("cpm"), None);

        let totals = Totals {
            impressions: 200.0,
            clicks: 4.0,
            spend: 0.0,
            revenue: 10.0,
        };
        assert_eq!(Metric::Ctr.value(&totals), 0.02);
        assert_eq!(Metric::Roas.value(&totals), 0.0);
    }

    #[test]
    fn test_summary_rollups() {
        let audit = Arc::new(AuditLog::new());
        let agent = DataAgent::new(&config(100.0, 5), audit.clone());
        let summary = agent.summarize(&dataset(), 7).unwrap();

        assert_eq!(summary.rows, 5);
        assert_eq!(summary.roas_trend.len(), 2);
        assert_eq!(summary.roas_trend[0].date, "2024-05-01");
        assert!((summary.roas_trend[0].roas - 160.0 / 60.0).abs() < 1e-9);

        // C is under the impressions floor but still counts toward spend share.
        let names: Vec<&str> = summary
            .campaign_performance
            .iter()
            .map(|c| c.campaign_name.as_str())
            .collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(summary.spend_distribution.len(), 3);

        let a = &summary.campaign_performance[0];
        assert!((a.ctr - 0.025).abs() < 1e-9);
        assert!((a.roas - 4.0).abs() < 1e-9);

        assert_eq!(summary.top_campaigns[0].campaign_name, "A");
        assert_eq!(summary.bottom_campaigns[0].campaign_name, "B");

        let share_a = summary
            .spend_distribution
            .iter()
            .find(|s| s.campaign_name == "A")
            .unwrap();
        assert!((share_a.share_pct - 100.0 * 100.0 / 120.0).abs() < 1e-9);

        assert!(audit.contains("data_loaded"));
        assert!(audit.contains("data_summary_ready"));
    }

    #[test]
    fn test_top_n_caps_rankings() {
        let agent = DataAgent::new(&config(0.0, 1), Arc::new(AuditLog::new()));
        let summary = agent.summarize(&dataset(), 7).unwrap();
        assert_eq!(summary.campaign_performance.len(), 3);
        assert_eq!(summary.top_campaigns.len(), 1);
        assert_eq!(summary.bottom_campaigns.len(), 1);
        // C has zero spend, so its ROAS is defined as zero.
        assert_eq!(summary.bottom_campaigns[0].campaign_name, "C");
    }

    #[test]
    fn test_window_applied() {
        let agent = DataAgent::new(&config(0.0, 5), Arc::new(AuditLog::new()));
        let summary = agent.summarize(&dataset(), 1).unwrap();
        assert_eq!(summary.rows, 3);
        assert_eq!(summary.roas_trend.len(), 1);
    }
}
