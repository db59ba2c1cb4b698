//! Audit trail
//!
//! Every significant pipeline step records an event (type + JSON payload).
//! Events go to `tracing` on the `audit` target, stay in memory for the
//! lifetime of the log, and are optionally appended to a daily JSONL file.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub run_id: String,
    pub event_type: String,
    pub payload: Value,
}

pub struct AuditLog {
    run_id: String,
    logs_dir: Option<PathBuf>,
    events: Mutex<Vec<AuditEvent>>,
}

impl AuditLog {
    /// In-memory log with no file output.
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            logs_dir: None,
            events: Mutex::new(Vec::new()),
        }
    }

    /// Log that also appends to `<dir>/run_YYYYMMDD.jsonl`.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            logs_dir: Some(dir.into()),
            ..Self::new()
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn record(&self, event_type: &str, payload: Value) {
        debug!(target: "audit", event_type, payload = %payload, "audit event");

        let event = AuditEvent {
            timestamp: Utc::now(),
            run_id: self.run_id.clone(),
            event_type: event_type.to_string(),
            payload,
        };

        // A failing audit file must not abort the run.
        if let Some(dir) = &self.logs_dir {
            if let Err(e) = append_jsonl(dir, &event) {
                warn!("Failed to write audit event '{}': {}", event_type, e);
            }
        }

        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.event_type).collect()
    }

    pub fn contains(&self, event_type: &str) -> bool {
        self.events().iter().any(|e| e.event_type == event_type)
    }

    pub fn log_file(&self) -> Option<PathBuf> {
        self.logs_dir
            .as_ref()
            .map(|dir| dir.join(file_name_for(&Utc::now())))
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

fn file_name_for(now: &DateTime<Utc>) -> String {
    format!("run_{}.jsonl", now.format("%Y%m%d"))
}

fn append_jsonl(dir: &Path, event: &AuditEvent) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(file_name_for(&event.timestamp));
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let line = serde_json::to_string(event)?;
    writeln!(file, "{}", line)?;
    Ok(())
}
