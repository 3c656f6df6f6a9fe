use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image_hasher::{HashAlg, HasherConfig};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Perceptual fingerprint of a frame on disk, in base64 form. Exact-set
/// membership on this form is enough to catch the near-duplicates a 1 fps
/// sample of a walkthrough produces.
pub fn compute_phash(frame_path: &Path) -> Result<String> {
    let img = image::open(frame_path)
        .with_context(|| format!("failed to decode frame {}", frame_path.display()))?;
    let hasher = HasherConfig::new()
        .hash_alg(HashAlg::DoubleGradient)
        .hash_size(8, 8)
        .to_hasher();

    Ok(hasher.hash_image(&img).to_base64())
}

/// Drop visually near-duplicate frames, preserving chronological order.
/// First occurrence always wins; the files of dropped duplicates are deleted
/// to bound scratch-disk usage.
///
/// Returns the surviving frames plus a degraded flag: when fingerprinting
/// fails on any frame the full input is returned unchanged rather than
/// losing the video's signal.
pub async fn dedup_frames(frames: Vec<PathBuf>) -> (Vec<PathBuf>, bool) {
    dedup_frames_with(frames, compute_phash).await
}

async fn dedup_frames_with<F>(frames: Vec<PathBuf>, fingerprint: F) -> (Vec<PathBuf>, bool)
where
    F: FnMut(&Path) -> Result<String> + Send + 'static,
{
    // Kept outside the worker so a panicking worker still degrades to the
    // full frame set instead of losing the video's signal.
    let fallback = frames.clone();
    let (kept, dropped, degraded) =
        tokio::task::spawn_blocking(move || dedup_by(frames, fingerprint))
            .await
            .unwrap_or_else(|err| {
                log_warn!("frame dedup worker panicked, keeping all frames: {err}");
                (fallback, Vec::new(), true)
            });

    for path in &dropped {
        if let Err(err) = tokio::fs::remove_file(path).await {
            log_warn!("failed to delete duplicate frame {}: {err}", path.display());
        }
    }

    log_info!(
        "frame dedup kept {} of {} frames{}",
        kept.len(),
        kept.len() + dropped.len(),
        if degraded { " (degraded, no dedup applied)" } else { "" }
    );

    (kept, degraded)
}

/// Core dedup over an injected fingerprint function. Fingerprints are
/// computed for the whole set first so a single corrupt frame degrades to
/// the identity result instead of losing frames.
fn dedup_by<F>(frames: Vec<PathBuf>, mut fingerprint: F) -> (Vec<PathBuf>, Vec<PathBuf>, bool)
where
    F: FnMut(&Path) -> Result<String>,
{
    let mut hashes = Vec::with_capacity(frames.len());
    for frame in &frames {
        match fingerprint(frame) {
            Ok(hash) => hashes.push(hash),
            Err(err) => {
                log_warn!(
                    "fingerprinting failed for {}, keeping all frames: {err:#}",
                    frame.display()
                );
                return (frames, Vec::new(), true);
            }
        }
    }

    let mut seen = HashSet::new();
    let mut kept = Vec::new();
    let mut dropped = Vec::new();
    for (frame, hash) in frames.into_iter().zip(hashes) {
        if seen.insert(hash) {
            kept.push(frame);
        } else {
            dropped.push(frame);
        }
    }

    (kept, dropped, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use image::RgbImage;

    fn write_gradient(dir: &Path, name: &str, horizontal: bool) -> PathBuf {
        let img = RgbImage::from_fn(64, 64, |x, y| {
            let v = if horizontal { (x * 4) as u8 } else { (y * 4) as u8 };
            image::Rgb([v, v, v])
        });
        let path = dir.join(name);
        img.save(&path).unwrap();
        path
    }

    fn write_checkerboard(dir: &Path, name: &str) -> PathBuf {
        let img = RgbImage::from_fn(64, 64, |x, y| {
            if (x / 8 + y / 8) % 2 == 0 {
                image::Rgb([255, 255, 255])
            } else {
                image::Rgb([0, 0, 0])
            }
        });
        let path = dir.join(name);
        img.save(&path).unwrap();
        path
    }

    #[tokio::test]
    async fn near_duplicates_are_dropped_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_gradient(dir.path(), "frame_0001.jpg", true);
        let b = write_gradient(dir.path(), "frame_0002.jpg", false);
        // a_dup has the same visual content as a
        let a_dup = dir.path().join("frame_0003.jpg");
        std::fs::copy(&a, &a_dup).unwrap();
        let c = write_checkerboard(dir.path(), "frame_0004.jpg");

        let (kept, degraded) =
            dedup_frames(vec![a.clone(), b.clone(), a_dup.clone(), c.clone()]).await;

        assert!(!degraded);
        assert_eq!(kept, vec![a, b, c]);
        assert!(!a_dup.exists(), "dropped duplicate file must be deleted");
    }

    #[test]
    fn fingerprint_failure_keeps_every_frame() {
        let frames: Vec<PathBuf> = (0..4)
            .map(|i| PathBuf::from(format!("frame_{i:04}.jpg")))
            .collect();

        let (kept, dropped, degraded) = dedup_by(frames.clone(), |path| {
            if path.ends_with("frame_0002.jpg") {
                Err(anyhow!("corrupt frame"))
            } else {
                Ok(path.display().to_string())
            }
        });

        assert!(degraded);
        assert!(dropped.is_empty());
        assert_eq!(kept, frames);
    }

    #[tokio::test]
    async fn panicking_worker_keeps_every_frame() {
        let frames: Vec<PathBuf> = (0..3)
            .map(|i| PathBuf::from(format!("frame_{i:04}.jpg")))
            .collect();

        let (kept, degraded) =
            dedup_frames_with(frames.clone(), |_: &Path| -> Result<String> {
                panic!("fingerprint worker crashed")
            })
            .await;

        assert!(degraded);
        assert_eq!(kept, frames);
    }

    #[test]
    fn first_occurrence_wins() {
        let frames: Vec<PathBuf> = ["a", "b", "a2", "c"]
            .iter()
            .map(|n| PathBuf::from(format!("{n}.jpg")))
            .collect();

        // a and a2 share a fingerprint
        let (kept, dropped, degraded) = dedup_by(frames, |path| {
            let stem = path.file_stem().unwrap().to_str().unwrap();
            Ok(stem.trim_end_matches(char::is_numeric).to_string())
        });

        assert!(!degraded);
        assert_eq!(
            kept,
            vec![PathBuf::from("a.jpg"), PathBuf::from("b.jpg"), PathBuf::from("c.jpg")]
        );
        assert_eq!(dropped, vec![PathBuf::from("a2.jpg")]);
    }
}
