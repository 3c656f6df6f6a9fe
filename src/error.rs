use thiserror::Error;

/// Errors produced by the analysis pipeline.
///
/// Only `Configuration` aborts a run. Item-level variants are captured into
/// the owning item's outcome; `Persistence` and `Render` are logged and never
/// discard findings that were already aggregated.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to fetch media item: {0}")]
    ItemFetch(String),

    #[error("video duration {actual_minutes:.1}min exceeds the {max_minutes}min limit")]
    DurationExceeded {
        actual_minutes: f64,
        max_minutes: u64,
    },

    #[error("frame extraction failed: {message}")]
    ExtractionFailed {
        message: String,
        /// ffmpeg itself was not found, as opposed to a malformed input file.
        tool_missing: bool,
    },

    #[error("frame deduplication degraded: {0}")]
    DeduplicationDegraded(String),

    #[error("vision analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("report rendering failed: {0}")]
    Render(String),
}

impl PipelineError {
    /// Whether the error should abort the whole run rather than a single item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::Configuration(_))
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
