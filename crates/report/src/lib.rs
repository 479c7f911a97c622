use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tierbay_engine::{
    BucketAnalysis, FleetSummary, MultipartAnalysis, PricingTable, ScanOutcome, Thresholds,
};
use uuid::Uuid;

pub mod text;

pub use text::render_text;

/// Everything a report is rendered from. Serialized as-is for the JSON
/// document.
#[derive(Debug, Clone, Serialize)]
pub struct ReportDocument {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub thresholds: Thresholds,
    pub pricing: PricingTable,
    pub bucket_analyses: Vec<BucketAnalysis>,
    pub multipart_analyses: Vec<MultipartAnalysis>,
    pub summary: FleetSummary,
}

impl ReportDocument {
    pub fn new(outcome: ScanOutcome, thresholds: Thresholds, pricing: PricingTable) -> Self {
        let summary = outcome.summarize(&pricing);
        Self {
            run_id: Uuid::new_v4(),
            generated_at: outcome.scanned_at,
            thresholds,
            pricing,
            bucket_analyses: outcome.bucket_analyses,
            multipart_analyses: outcome.multipart_analyses,
            summary,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Path of the JSON document written next to a text report.
pub fn json_path_for(text_path: &Path) -> PathBuf {
    text_path.with_extension("json")
}

/// Write the text report to `output` and the JSON document beside it.
pub async fn write_reports(document: &ReportDocument, output: &Path) -> Result<(PathBuf, PathBuf)> {
    let json_output = json_path_for(output);

    tokio::fs::write(output, render_text(document))
        .await
        .with_context(|| format!("Failed to write report to {}", output.display()))?;
    tracing::info!("Report written to: {}", output.display());

    tokio::fs::write(&json_output, document.to_json()?)
        .await
        .with_context(|| format!("Failed to write JSON data to {}", json_output.display()))?;
    tracing::info!("JSON data written to: {}", json_output.display());

    Ok((output.to_path_buf(), json_output))
}
