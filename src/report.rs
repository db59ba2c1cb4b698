//! Report persistence for a finished run.

use crate::error::Result;
use crate::executor::ResultBundle;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

pub const INSIGHTS_FILE: &str = "insights.json";
pub const CREATIVES_FILE: &str = "creatives.json";
pub const REPORT_FILE: &str = "report.md";

/// Write `insights.json` and `creatives.json` for the slots that are set, and
/// always `report.md`. Returns the written paths.
pub fn save(bundle: &ResultBundle, dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::new();

    if let Some(evaluated) = &bundle.evaluated {
        let path = dir.join(INSIGHTS_FILE);
        std::fs::write(&path, serde_json::to_string_pretty(evaluated)?)?;
        written.push(path);
    }

    if let Some(creatives) = &bundle.creatives {
        let path = dir.join(CREATIVES_FILE);
        std::fs::write(&path, serde_json::to_string_pretty(creatives)?)?;
        written.push(path);
    }

    let path = dir.join(REPORT_FILE);
    std::fs::write(&path, render_markdown(bundle)?)?;
    written.push(path);

    info!("📝 Saved {} report files to {}", written.len(), dir.display());
    Ok(written)
}

pub fn render_markdown(bundle: &ResultBundle) -> Result<String> {
    let mut out = String::new();
    out.push_str("# Facebook Ads Performance Report\n\n");

    out.push_str("## Validated Insights\n");
    json_block(&mut out, &bundle.evaluated)?;
    out.push('\n');

    out.push_str("## Creative Recommendations\n");
    json_block(&mut out, &bundle.creatives)?;
    Ok(out)
}

fn json_block<T: Serialize>(out: &mut String, slot: &Option<Vec<T>>) -> Result<()> {
    let body = match slot {
        Some(items) => serde_json::to_string_pretty(items)?,
        None => "[]".to_string(),
    };
    out.push_str(&format!("```json\n{}\n```\n", body));
    Ok(())
}
