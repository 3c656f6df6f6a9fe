use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

const DEFAULT_MAX_VIDEO_MINUTES: u64 = 20;
const DEFAULT_ANALYSIS_WINDOW: usize = 4;
const DEFAULT_WINDOW_PAUSE_MS: u64 = 500;

/// Process-wide configuration, built once at startup and passed by reference
/// into each component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Base URL of the external vision model endpoint.
    pub vision_endpoint: String,
    /// API key for the vision model. Required.
    pub vision_api_key: String,
    pub vision_model: String,
    /// Ceiling applied by the duration guard before extraction.
    pub max_video_minutes: u64,
    /// Concurrent vision calls per batch window.
    pub analysis_window: usize,
    /// Pause between batch windows, to stay under model rate limits.
    pub window_pause_ms: u64,
    /// Root under which per-item scratch directories are created.
    pub scratch_root: PathBuf,
    pub db_path: PathBuf,
    /// Root directory of the local blob store.
    pub blob_root: PathBuf,
    pub media_bucket: String,
    pub report_bucket: String,
}

impl Settings {
    /// Read settings from the environment. A missing vision API key is a
    /// configuration error and aborts before any processing starts.
    pub fn from_env() -> PipelineResult<Self> {
        let vision_api_key = env::var("SITECHECK_VISION_API_KEY")
            .map_err(|_| PipelineError::Configuration("SITECHECK_VISION_API_KEY is not set".into()))?;
        if vision_api_key.trim().is_empty() {
            return Err(PipelineError::Configuration(
                "SITECHECK_VISION_API_KEY is empty".into(),
            ));
        }

        let analysis_window = env_parse("SITECHECK_ANALYSIS_WINDOW", DEFAULT_ANALYSIS_WINDOW);

        Ok(Self {
            vision_endpoint: env::var("SITECHECK_VISION_ENDPOINT")
                .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".into()),
            vision_api_key,
            vision_model: env::var("SITECHECK_VISION_MODEL").unwrap_or_else(|_| "gpt-4o".into()),
            max_video_minutes: env_parse("SITECHECK_MAX_VIDEO_MINUTES", DEFAULT_MAX_VIDEO_MINUTES),
            analysis_window: analysis_window.clamp(1, 8),
            window_pause_ms: env_parse("SITECHECK_WINDOW_PAUSE_MS", DEFAULT_WINDOW_PAUSE_MS),
            scratch_root: env_path("SITECHECK_SCRATCH_ROOT", || env::temp_dir().join("sitecheck")),
            db_path: env_path("SITECHECK_DB_PATH", || PathBuf::from("sitecheck.db")),
            blob_root: env_path("SITECHECK_BLOB_ROOT", || PathBuf::from("blobs")),
            media_bucket: env::var("SITECHECK_MEDIA_BUCKET").unwrap_or_else(|_| "media".into()),
            report_bucket: env::var("SITECHECK_REPORT_BUCKET").unwrap_or_else(|_| "reports".into()),
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

fn env_path(key: &str, default: impl FnOnce() -> PathBuf) -> PathBuf {
    env::var(key).map(PathBuf::from).unwrap_or_else(|_| default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_api_key_is_a_configuration_error() {
        env::remove_var("SITECHECK_VISION_API_KEY");
        let err = Settings::from_env().unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("SITECHECK_VISION_API_KEY"));
    }
}
