use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One upload-and-analyze workflow instance, grouping one or more media items.
/// Immutable after creation; only the session report is replaced on reprocess.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    /// Declared area tags in upload order ("Kitchen", "Storage", ...).
    #[serde(default)]
    pub areas: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

/// An uploaded photo or video. Read-only input to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub id: String,
    pub session_id: String,
    pub kind: MediaKind,
    /// Bucket-relative path in the blob store.
    pub storage_path: String,
    #[serde(default)]
    pub area: Option<String>,
    pub owner: String,
}

/// Processing state of a single media item. Image items skip the video-only
/// stages and go straight from `Downloaded` to `Analyzing`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ItemStatus {
    Pending,
    Downloaded,
    Extracting,
    Deduplicating,
    Analyzing,
    Done,
    Failed,
}

impl Default for ItemStatus {
    fn default() -> Self {
        ItemStatus::Pending
    }
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Downloaded => "downloaded",
            ItemStatus::Extracting => "extracting",
            ItemStatus::Deduplicating => "deduplicating",
            ItemStatus::Analyzing => "analyzing",
            ItemStatus::Done => "done",
            ItemStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Done | ItemStatus::Failed)
    }
}

/// Terminal record for one media item, returned to the caller alongside the
/// aggregate report. A failed item always carries a non-empty error message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemOutcome {
    pub item_id: String,
    pub kind: MediaKind,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Findings attributed to this item before session-level deduplication.
    pub finding_count: usize,
    /// For video: frames analyzed after deduplication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames_analyzed: Option<usize>,
}

impl ItemOutcome {
    pub fn done(item: &MediaItem, finding_count: usize, frames_analyzed: Option<usize>) -> Self {
        Self {
            item_id: item.id.clone(),
            kind: item.kind,
            status: ItemStatus::Done,
            error: None,
            finding_count,
            frames_analyzed,
        }
    }

    pub fn failed(item: &MediaItem, error: impl Into<String>) -> Self {
        Self {
            item_id: item.id.clone(),
            kind: item.kind,
            status: ItemStatus::Failed,
            error: Some(error.into()),
            finding_count: 0,
            frames_analyzed: None,
        }
    }
}
