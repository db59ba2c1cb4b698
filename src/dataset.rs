//! Ad performance dataset
//!
//! Thin wrapper over a polars `DataFrame` with the handful of operations the
//! agents need: windowing by date, segment filters, and column totals.

use crate::config::DataConfig;
use crate::error::{PipelineError, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

/// Columns every dataset must provide.
pub const REQUIRED_COLUMNS: [&str; 6] = [
    "date",
    "campaign_name",
    "impressions",
    "clicks",
    "spend",
    "revenue",
];

/// Optional column with the ad copy shown to users.
pub const CREATIVE_MESSAGE_COLUMN: &str = "creative_message";

// 1970-01-01 counted from 0001-01-01 (day 1).
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Summed counters for a set of rows. Nulls count as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Totals {
    pub impressions: f64,
    pub clicks: f64,
    pub spend: f64,
    pub revenue: f64,
}

/// Totals for one value of a grouping column.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupTotals {
    pub key: String,
    pub totals: Totals,
}

#[derive(Debug, Clone)]
pub struct Dataset {
    frame: DataFrame,
}

impl Dataset {
    /// Load the dataset selected by the data config.
    pub fn load(config: &DataConfig) -> Result<Self> {
        Self::from_csv(config.dataset_path())
    }

    pub fn from_csv(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PipelineError::Dataset(format!(
                "Dataset not found at: {}",
                path.display()
            )));
        }

        let frame = LazyCsvReader::new(path)
            .with_try_parse_dates(true)
            .with_infer_schema_length(Some(1000))
            .finish()
            .map_err(|e| PipelineError::Dataset(format!("Failed to read CSV: {}", e)))?
            .collect()
            .map_err(|e| PipelineError::Dataset(format!("Failed to collect: {}", e)))?;

        info!("📊 Loaded {} rows from {}", frame.height(), path.display());
        Self::from_frame(frame)
    }

    /// Validate required columns and normalise `date` to a polars `Date`.
    pub fn from_frame(frame: DataFrame) -> Result<Self> {
        let columns: Vec<String> = frame
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|required| !columns.iter().any(|c| c == required))
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::Dataset(format!(
                "Dataset is missing required columns: {}",
                missing.join(", ")
            )));
        }

        let frame = normalize_dates(frame)?;
        Ok(Self { frame })
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    pub fn column_names(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.frame.get_column_names().iter().any(|c| *c == name)
    }

    pub fn min_date(&self) -> Result<Option<NaiveDate>> {
        Ok(self
            .epoch_days()?
            .into_iter()
            .flatten()
            .min()
            .and_then(epoch_day_to_date))
    }

    pub fn max_date(&self) -> Result<Option<NaiveDate>> {
        Ok(self
            .epoch_days()?
            .into_iter()
            .flatten()
            .max()
            .and_then(epoch_day_to_date))
    }

    /// Rows from the last `days` calendar days, counted back from the latest
    /// date present in the data (inclusive).
    pub fn last_n_days(&self, days: u32) -> Result<Dataset> {
        let Some(latest) = self.epoch_days()?.into_iter().flatten().max() else {
            return Ok(self.empty_like());
        };
        let span = i32::try_from(days.max(1)).unwrap_or(i32::MAX);
        let cutoff = latest.saturating_sub(span - 1);
        self.filter(col("date").cast(DataType::Int32).gt_eq(lit(cutoff)))
    }

    /// Rows dated strictly before `date`.
    pub fn before(&self, date: NaiveDate) -> Result<Dataset> {
        let day = date_to_epoch_day(date);
        self.filter(col("date").cast(DataType::Int32).lt(lit(day)))
    }

    /// Keep rows matching every `column:value` filter (exact match on the
    /// column's string form). Malformed filters and unknown columns are skipped.
    pub fn filter_segments(&self, segments: &[String]) -> Result<Dataset> {
        let mut predicate: Option<Expr> = None;

        for segment in segments {
            let Some((column, value)) = segment.split_once(':') else {
                warn!("Ignoring malformed segment filter '{}'", segment);
                continue;
            };
            let column = column.trim();
            if !self.has_column(column) {
                warn!("Ignoring segment filter on unknown column '{}'", column);
                continue;
            }

            let condition = col(column)
                .cast(DataType::String)
                .eq(lit(value.trim().to_string()));
            predicate = Some(match predicate {
                Some(existing) => existing.and(condition),
                None => condition,
            });
        }

        match predicate {
            Some(predicate) => self.filter(predicate),
            None => Ok(self.clone()),
        }
    }

    pub fn totals(&self) -> Result<Totals> {
        Ok(Totals {
            impressions: column_sum(&self.frame, "impressions")?,
            clicks: column_sum(&self.frame, "clicks")?,
            spend: column_sum(&self.frame, "spend")?,
            revenue: column_sum(&self.frame, "revenue")?,
        })
    }

    /// Totals per distinct value of `key`, ordered by key. Rows with a null
    /// key are dropped.
    pub fn rollup_by(&self, key: &str) -> Result<Vec<GroupTotals>> {
        let grouped = self
            .frame
            .clone()
            .lazy()
            .group_by([col(key)])
            .agg([
                col("impressions").cast(DataType::Float64).sum().alias("impressions"),
                col("clicks").cast(DataType::Float64).sum().alias("clicks"),
                col("spend").cast(DataType::Float64).sum().alias("spend"),
                col("revenue").cast(DataType::Float64).sum().alias("revenue"),
            ])
            .collect()?;

        let keys = string_values(&grouped, key)?;
        let impressions = float_values(&grouped, "impressions")?;
        let clicks = float_values(&grouped, "clicks")?;
        let spend = float_values(&grouped, "spend")?;
        let revenue = float_values(&grouped, "revenue")?;

        let mut groups: Vec<GroupTotals> = keys
            .into_iter()
            .enumerate()
            .filter_map(|(i, key)| {
                key.map(|key| GroupTotals {
                    key,
                    totals: Totals {
                        impressions: impressions[i],
                        clicks: clicks[i],
                        spend: spend[i],
                        revenue: revenue[i],
                    },
                })
            })
            .collect();
        groups.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(groups)
    }

    /// Up to `limit` distinct creative messages used by `campaign`.
    pub fn sample_messages(&self, campaign: &str, limit: usize) -> Result<Vec<String>> {
        if !self.has_column(CREATIVE_MESSAGE_COLUMN) {
            return Ok(Vec::new());
        }

        let rows = self.filter(
            col("campaign_name")
                .cast(DataType::String)
                .eq(lit(campaign.to_string())),
        )?;

        let mut messages: Vec<String> = Vec::new();
        for message in string_values(&rows.frame, CREATIVE_MESSAGE_COLUMN)?
            .into_iter()
            .flatten()
        {
            if messages.len() >= limit {
                break;
            }
            if !message.trim().is_empty() && !messages.contains(&message) {
                messages.push(message);
            }
        }
        Ok(messages)
    }

    fn filter(&self, predicate: Expr) -> Result<Dataset> {
        let frame = self.frame.clone().lazy().filter(predicate).collect()?;
        Ok(Self { frame })
    }

    /// Same schema, no rows.
    pub fn empty_like(&self) -> Dataset {
        Self {
            frame: self.frame.head(Some(0)),
        }
    }

    fn epoch_days(&self) -> Result<Vec<Option<i32>>> {
        Ok(self
            .frame
            .column("date")?
            .cast(&DataType::Int32)?
            .i32()?
            .into_iter()
            .collect())
    }
}

fn normalize_dates(mut frame: DataFrame) -> Result<DataFrame> {
    let dtype = frame.column("date")?.dtype().clone();
    let normalized = match dtype {
        DataType::Date => return Ok(frame),
        DataType::Datetime(_, _) => frame.column("date")?.cast(&DataType::Date)?,
        DataType::String => {
            let days: Vec<Option<i32>> = frame
                .column("date")?
                .str()?
                .into_iter()
                .map(|value| value.and_then(parse_epoch_day))
                .collect();
            let unparsed = days.iter().filter(|d| d.is_none()).count();
            if unparsed > 0 {
                warn!("{} rows have an unparseable date and will be ignored by date windows", unparsed);
            }
            Series::new("date", days).cast(&DataType::Date)?
        }
        other => {
            return Err(PipelineError::Dataset(format!(
                "Unsupported type for 'date' column: {}",
                other
            )))
        }
    };
    frame.with_column(normalized)?;
    Ok(frame)
}

fn parse_epoch_day(value: &str) -> Option<i32> {
    let value = value.trim();
    let date = ["%Y-%m-%d", "%Y/%m/%d", "%d-%m-%Y", "%m/%d/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .or_else(|| {
            ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
                .map(|dt| dt.date())
        })?;
    Some(date_to_epoch_day(date))
}

fn date_to_epoch_day(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - EPOCH_DAYS_FROM_CE
}

fn epoch_day_to_date(day: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(day.checked_add(EPOCH_DAYS_FROM_CE)?)
}

fn column_sum(frame: &DataFrame, name: &str) -> Result<f64> {
    Ok(frame
        .column(name)?
        .cast(&DataType::Float64)?
        .f64()?
        .into_iter()
        .flatten()
        .filter(|v| v.is_finite())
        .sum())
}

fn float_values(frame: &DataFrame, name: &str) -> Result<Vec<f64>> {
    Ok(frame
        .column(name)?
        .cast(&DataType::Float64)?
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(0.0))
        .collect())
}

fn string_values(frame: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    Ok(frame
        .column(name)?
        .cast(&DataType::String)?
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        let frame = df![
            "date" => ["2024-03-01", "2024-03-02", "2024-03-03", "2024-03-04", "2024-03-04"],
            "campaign_name" => ["A", "A", "B", "A", "B"],
            "impressions" => [1000i64, 1000, 500, 2000, 0],
            "clicks" => [10i64, 20, 5, 40, 0],
            "spend" => [10.0, 10.0, 5.0, 20.0, 0.0],
            "revenue" => [30.0, 20.0, 5.0, 80.0, 0.0],
            "creative_message" => ["Big sale", "Big sale", "Free shipping", "Last chance", ""]
        ]
        .unwrap();
        Dataset::from_frame(frame).unwrap()
    }

    #[test]
    fn test_dates_normalised_from_strings() {
        let data = sample();
        assert_eq!(data.frame().column("date").unwrap().dtype(), &DataType::Date);
        assert_eq!(data.min_date().unwrap(), NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(data.max_date().unwrap(), NaiveDate::from_ymd_opt(2024, 3, 4));
    }

    #[test]
    fn test_missing_columns_rejected() {
        let frame = df![
            "date" => ["2024-03-01"],
            "campaign_name" => ["A"]
        ]
        .unwrap();
        let err = Dataset::from_frame(frame).unwrap_err();
        assert!(err.to_string().contains("impressions"));
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let err = Dataset::from_csv(Path::new("no/such/ads.csv")).unwrap_err();
        assert!(err.to_string().contains("Dataset not found at"));
    }

    #[test]
    fn test_last_n_days_anchored_at_latest_date() {
        let data = sample();
        let window = data.last_n_days(2).unwrap();
        assert_eq!(window.height(), 3);
        assert_eq!(window.min_date().unwrap(), NaiveDate::from_ymd_opt(2024, 3, 3));
    }

    #[test]
    fn test_before_excludes_boundary() {
        let data = sample();
        let prior = data.before(NaiveDate::from_ymd_opt(2024, 3, 3).unwrap()).unwrap();
        assert_eq!(prior.height(), 2);
    }

    #[test]
    fn test_segment_filters_are_conjunctive() {
        let data = sample();
        let a = data.filter_segments(&["campaign_name:A".to_string()]).unwrap();
        assert_eq!(a.height(), 3);

        let a_on_day = data
            .filter_segments(&["campaign_name:A".to_string(), "date:2024-03-04".to_string()])
            .unwrap();
        assert_eq!(a_on_day.height(), 1);

        let unknown = data
            .filter_segments(&["country:US".to_string(), "broken".to_string()])
            .unwrap();
        assert_eq!(unknown.height(), data.height());
    }

    #[test]
    fn test_totals_and_rollup() {
        let data = sample();
        let totals = data.totals().unwrap();
        assert_eq!(totals.impressions, 4500.0);
        assert_eq!(totals.clicks, 75.0);

        let groups = data.rollup_by("campaign_name").unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, "A");
        assert_eq!(groups[0].totals.revenue, 130.0);
        assert_eq!(groups[1].key, "B");
        assert_eq!(groups[1].totals.spend, 5.0);

        let days = data.rollup_by("date").unwrap();
        assert_eq!(days.first().map(|g| g.key.as_str()), Some("2024-03-01"));
        assert_eq!(days.len(), 4);
    }

    #[test]
    fn test_sample_messages_distinct() {
        let data = sample();
        assert_eq!(
            data.sample_messages("A", 5).unwrap(),
            vec!["Big sale".to_string(), "Last chance".to_string()]
        );
        assert!(data.sample_messages("B", 0).unwrap().is_empty());
    }
}
