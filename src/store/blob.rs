use std::future::Future;
use std::path::PathBuf;

use crate::error::{PipelineError, PipelineResult};

/// Binary storage collaborator: source videos and images come from here and
/// the rendered report document goes back in. Implementations own nothing
/// but bytes.
pub trait BlobStore: Send + Sync {
    fn download(
        &self,
        bucket: &str,
        path: &str,
    ) -> impl Future<Output = PipelineResult<Vec<u8>>> + Send;

    /// Store bytes and return a retrievable URL.
    fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> impl Future<Output = PipelineResult<String>> + Send;

    fn public_url(&self, bucket: &str, path: &str) -> String;
}

/// Filesystem-backed blob store: buckets are directories under a root.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn blob_path(&self, bucket: &str, path: &str) -> PathBuf {
        self.root.join(bucket).join(path)
    }
}

impl BlobStore for LocalBlobStore {
    fn download(
        &self,
        bucket: &str,
        path: &str,
    ) -> impl Future<Output = PipelineResult<Vec<u8>>> + Send {
        let blob = self.blob_path(bucket, path);
        async move {
            tokio::fs::read(&blob).await.map_err(|err| {
                PipelineError::ItemFetch(format!("{}: {err}", blob.display()))
            })
        }
    }

    fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> impl Future<Output = PipelineResult<String>> + Send {
        let blob = self.blob_path(bucket, path);
        let url = self.public_url(bucket, path);
        async move {
            if let Some(parent) = blob.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|err| {
                    PipelineError::Persistence(format!("create {}: {err}", parent.display()))
                })?;
            }
            tokio::fs::write(&blob, bytes).await.map_err(|err| {
                PipelineError::Persistence(format!("write {}: {err}", blob.display()))
            })?;
            Ok(url)
        }
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("file://{}", self.blob_path(bucket, path).display())
    }
}

/// In-memory fake for tests.
#[cfg(test)]
pub mod fake {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct MemoryBlobStore {
        pub blobs: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl MemoryBlobStore {
        pub fn with(entries: &[(&str, &[u8])]) -> Self {
            let store = Self::default();
            {
                let mut blobs = store.blobs.lock().unwrap();
                for (key, bytes) in entries {
                    blobs.insert(key.to_string(), bytes.to_vec());
                }
            }
            store
        }

        fn key(bucket: &str, path: &str) -> String {
            format!("{bucket}/{path}")
        }
    }

    impl BlobStore for MemoryBlobStore {
        fn download(
            &self,
            bucket: &str,
            path: &str,
        ) -> impl Future<Output = PipelineResult<Vec<u8>>> + Send {
            let found = self
                .blobs
                .lock()
                .unwrap()
                .get(&Self::key(bucket, path))
                .cloned();
            let missing = format!("{bucket}/{path} not found");
            async move { found.ok_or(PipelineError::ItemFetch(missing)) }
        }

        fn upload(
            &self,
            bucket: &str,
            path: &str,
            bytes: Vec<u8>,
            _content_type: &str,
        ) -> impl Future<Output = PipelineResult<String>> + Send {
            self.blobs
                .lock()
                .unwrap()
                .insert(Self::key(bucket, path), bytes);
            let url = self.public_url(bucket, path);
            async move { Ok(url) }
        }

        fn public_url(&self, bucket: &str, path: &str) -> String {
            format!("memory://{bucket}/{path}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_store_round_trips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path().to_path_buf());

        let url = store
            .upload("reports", "sess-1/report.pdf", b"%PDF-demo".to_vec(), "application/pdf")
            .await
            .unwrap();
        assert!(url.starts_with("file://"));

        let bytes = store.download("reports", "sess-1/report.pdf").await.unwrap();
        assert_eq!(bytes, b"%PDF-demo");
    }

    #[tokio::test]
    async fn missing_blob_is_an_item_fetch_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path().to_path_buf());
        match store.download("media", "absent.jpg").await {
            Err(PipelineError::ItemFetch(_)) => {}
            other => panic!("expected ItemFetch, got {other:?}"),
        }
    }
}
