use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tokio::process::Command;

/// Result of checking a video against the configured duration ceiling.
/// `error` is set when probing itself failed; callers must treat that as a
/// skip, never as approval.
#[derive(Debug, Clone, PartialEq)]
pub struct DurationCheck {
    pub valid: bool,
    pub duration_minutes: Option<f64>,
    pub max_duration_minutes: u64,
    pub error: Option<String>,
}

/// Probe a video's duration in seconds using ffprobe.
pub async fn probe_duration(video_path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "csv=p=0",
        ])
        .arg(video_path)
        .output()
        .await
        .context("failed to execute ffprobe")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("ffprobe failed: {}", stderr.trim()));
    }

    let raw = String::from_utf8(output.stdout).context("ffprobe output is not valid UTF-8")?;
    raw.trim()
        .parse::<f64>()
        .with_context(|| format!("unexpected ffprobe output '{}'", raw.trim()))
}

/// Validate a video against the configured ceiling before extraction is
/// attempted. Unbounded length would let extraction and batched analysis
/// grow unbounded cost, so this runs first.
pub async fn check_duration(video_path: &Path, max_minutes: u64) -> DurationCheck {
    match probe_duration(video_path).await {
        Ok(seconds) => from_duration_secs(seconds, max_minutes),
        Err(err) => DurationCheck {
            valid: false,
            duration_minutes: None,
            max_duration_minutes: max_minutes,
            error: Some(format!("duration probe failed: {err:#}")),
        },
    }
}

fn from_duration_secs(seconds: f64, max_minutes: u64) -> DurationCheck {
    let minutes = seconds / 60.0;
    if minutes > max_minutes as f64 {
        DurationCheck {
            valid: false,
            duration_minutes: Some(minutes),
            max_duration_minutes: max_minutes,
            error: Some(format!(
                "video is {minutes:.1} minutes long, limit is {max_minutes} minutes"
            )),
        }
    } else {
        DurationCheck {
            valid: true,
            duration_minutes: Some(minutes),
            max_duration_minutes: max_minutes,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn over_the_ceiling_is_invalid_and_names_both_durations() {
        let check = from_duration_secs(25.0 * 60.0, 20);
        assert!(!check.valid);
        let error = check.error.unwrap();
        assert!(error.contains("25.0"));
        assert!(error.contains("20"));
    }

    #[test]
    fn under_the_ceiling_is_valid() {
        let check = from_duration_secs(12.0 * 60.0, 20);
        assert!(check.valid);
        assert_eq!(check.error, None);
        assert_eq!(check.duration_minutes, Some(12.0));
    }

    #[test]
    fn exactly_at_the_ceiling_is_valid() {
        let check = from_duration_secs(20.0 * 60.0, 20);
        assert!(check.valid);
    }

    #[tokio::test]
    async fn probe_failure_reports_an_error_instead_of_approving() {
        let check = check_duration(Path::new("/nonexistent/walkthrough.mp4"), 20).await;
        assert!(!check.valid);
        assert_eq!(check.duration_minutes, None);
        assert!(check.error.unwrap().contains("probe failed"));
    }
}
