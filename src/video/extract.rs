use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::error::{PipelineError, PipelineResult};

/// Decode a video into sequentially numbered JPEG frames at one frame per
/// second. The output directory is created if absent; the source video is
/// left untouched.
///
/// A missing ffmpeg binary is reported as `tool_missing` (operational), a
/// non-zero exit as malformed input (data quality) — callers mark the single
/// item failed either way without aborting the session.
pub async fn extract_frames(video_path: &Path, out_dir: &Path) -> PipelineResult<Vec<PathBuf>> {
    tokio::fs::create_dir_all(out_dir)
        .await
        .map_err(|err| PipelineError::ExtractionFailed {
            message: format!("failed to create frame directory {}: {err}", out_dir.display()),
            tool_missing: false,
        })?;

    let output_pattern = out_dir.join("frame_%04d.jpg");

    let status = Command::new("ffmpeg")
        .arg("-i")
        .arg(video_path)
        .arg("-vf")
        .arg("fps=1")
        .arg("-y")
        .arg(&output_pattern)
        .status()
        .await
        .map_err(|err| {
            let tool_missing = err.kind() == ErrorKind::NotFound;
            PipelineError::ExtractionFailed {
                message: if tool_missing {
                    "ffmpeg is not installed or not on PATH".to_string()
                } else {
                    format!("failed to execute ffmpeg: {err}")
                },
                tool_missing,
            }
        })?;

    if !status.success() {
        return Err(PipelineError::ExtractionFailed {
            message: format!(
                "ffmpeg exited with {} for {}",
                status,
                video_path.display()
            ),
            tool_missing: false,
        });
    }

    list_frames(out_dir).await
}

/// Collect extracted frames in sequence order. The frame_%04d naming makes
/// the lexicographic sort chronological.
async fn list_frames(out_dir: &Path) -> PipelineResult<Vec<PathBuf>> {
    let mut frames = Vec::new();
    let mut entries = tokio::fs::read_dir(out_dir)
        .await
        .map_err(|err| PipelineError::ExtractionFailed {
            message: format!("failed to read frame directory: {err}"),
            tool_missing: false,
        })?;

    while let Some(entry) = entries.next_entry().await.map_err(|err| {
        PipelineError::ExtractionFailed {
            message: format!("failed to list frames: {err}"),
            tool_missing: false,
        }
    })? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("jpg") {
            frames.push(path);
        }
    }

    frames.sort();
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_are_listed_in_sequence_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["frame_0003.jpg", "frame_0001.jpg", "frame_0002.jpg", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let frames = list_frames(dir.path()).await.unwrap();
        let names: Vec<_> = frames
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["frame_0001.jpg", "frame_0002.jpg", "frame_0003.jpg"]);
    }

    #[tokio::test]
    async fn malformed_input_fails_without_flagging_the_tool() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("not_a_video.mp4");
        std::fs::write(&bogus, b"not an mp4").unwrap();

        match extract_frames(&bogus, &dir.path().join("frames")).await {
            Err(PipelineError::ExtractionFailed { tool_missing, .. }) => {
                // tool_missing only when ffmpeg itself is absent from PATH
                if which_ffmpeg() {
                    assert!(!tool_missing);
                }
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("extraction of a bogus file should fail"),
        }
    }

    fn which_ffmpeg() -> bool {
        std::process::Command::new("ffmpeg")
            .arg("-version")
            .output()
            .is_ok()
    }
}
