use std::path::{Path, PathBuf};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_warn;
use crate::models::MediaItem;

/// Process-local temporary storage for one processing run. Directories are
/// namespaced per media item so no two items ever share a path.
#[derive(Debug, Clone)]
pub struct Scratch {
    session_root: PathBuf,
}

impl Scratch {
    pub fn new(scratch_root: &Path, session_id: &str) -> Self {
        Self {
            session_root: scratch_root.join(session_id),
        }
    }

    pub fn session_root(&self) -> &Path {
        &self.session_root
    }

    /// Directory for one item's temp copy of the source media.
    pub fn item_dir(&self, item: &MediaItem) -> PathBuf {
        self.session_root.join(&item.id)
    }

    /// Directory the frame extractor writes into for one video item.
    pub fn frame_dir(&self, item: &MediaItem) -> PathBuf {
        self.session_root.join(&item.id).join("frames")
    }

    /// Remove one item's scratch directory. Tolerates already-missing paths
    /// and logs (but never raises) on deletion errors.
    pub async fn cleanup_item(&self, item: &MediaItem) {
        remove_tolerant(&self.item_dir(item)).await;
    }

    /// Remove the whole session namespace. Runs on both the success and the
    /// failure exit path of a run.
    pub async fn cleanup_all(&self) {
        remove_tolerant(&self.session_root).await;
    }
}

async fn remove_tolerant(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => log_warn!("failed to remove scratch path {}: {err}", path.display()),
    }
}
