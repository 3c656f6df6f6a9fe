use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::finding::Finding;

/// Counts derived from the deduplicated finding list. Info findings are
/// counted separately and excluded from the violation totals.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total_violations: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub info: usize,
    /// Category label -> violation count; empty categories omitted.
    pub by_category: Vec<(String, usize)>,
    pub media_analyzed: usize,
    pub media_failed: usize,
}

/// The singleton per-session report, upserted by session id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub session_id: String,
    pub generated_at: DateTime<Utc>,
    pub summary: ReportSummary,
    pub findings: Vec<Finding>,
    /// Public URL of the rendered document, when the upload succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_url: Option<String>,
}
