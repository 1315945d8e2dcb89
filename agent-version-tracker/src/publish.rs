//! Snapshot publishing to blob storage.
//!
//! The storage side of the pipeline is a small capability trait with three
//! implementations: [`GcsStore`] talking to the Google Cloud Storage JSON
//! API, [`LocalStore`] writing files under a directory (local runs and smoke
//! tests), and [`MemoryStore`] as an inspectable test double.
//!
//! Each run publishes the complete snapshot exactly once, as a full replace
//! of the previous document. [`PublishMode::Staged`] is the opt-in hardened
//! variant: the document is written to a staging key first and promoted in
//! one step, so readers never observe a partial write.

use crate::snapshot::AggregatedSnapshot;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Errors produced by a snapshot store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage request could not be completed.
    #[error("storage request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The storage service refused the operation.
    #[error("storage rejected the operation with HTTP {status}: {message}")]
    Rejected { status: u16, message: String },

    /// A local filesystem operation failed.
    #[error("storage I/O failed for '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Write access to a single bucket of named objects.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Writes `bytes` under `key`, unconditionally replacing prior content.
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// Moves the object at `staging_key` to `final_key`, replacing prior
    /// content at the destination and removing the staging object.
    async fn promote(&self, staging_key: &str, final_key: &str) -> Result<(), StoreError>;
}

const GCS_ENDPOINT: &str = "https://storage.googleapis.com";

/// Google Cloud Storage via its JSON API.
///
/// Authenticated with an externally supplied bearer token; the token is
/// never logged.
pub struct GcsStore {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
    token: String,
}

impl GcsStore {
    /// Creates a store for `bucket` with an explicit request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Transport`] if the HTTP client cannot be
    /// constructed.
    pub fn new(bucket: &str, token: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: GCS_ENDPOINT.to_string(),
            bucket: bucket.to_string(),
            token: token.to_string(),
        })
    }

    /// Points the store at a different endpoint, for emulators.
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }

    async fn check(response: reqwest::Response) -> Result<(), StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let message = response.text().await.unwrap_or_default();
        Err(StoreError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl SnapshotStore for GcsStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let url = format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.endpoint,
            urlencoding::encode(&self.bucket),
            urlencoding::encode(key)
        );
        debug!(bucket = %self.bucket, key, size = bytes.len(), "Uploading object");

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(bytes.to_vec())
            .send()
            .await?;
        Self::check(response).await
    }

    async fn promote(&self, staging_key: &str, final_key: &str) -> Result<(), StoreError> {
        // Server-side rewrite, then delete the staging object. The rewrite
        // replaces the destination in one operation.
        let rewrite_url = format!(
            "{}/storage/v1/b/{bucket}/o/{}/rewriteTo/b/{bucket}/o/{}",
            self.endpoint,
            urlencoding::encode(staging_key),
            urlencoding::encode(final_key),
            bucket = urlencoding::encode(&self.bucket),
        );
        debug!(bucket = %self.bucket, from = staging_key, to = final_key, "Promoting object");

        let response = self
            .client
            .post(rewrite_url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::check(response).await?;

        let delete_url = format!(
            "{}/storage/v1/b/{}/o/{}",
            self.endpoint,
            urlencoding::encode(&self.bucket),
            urlencoding::encode(staging_key)
        );
        let response = self
            .client
            .delete(delete_url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::check(response).await
    }
}

/// A directory of files standing in for a bucket.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Creates a store rooted at `root`. The directory is created on first
    /// write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn io_error(path: &std::path::Path, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl SnapshotStore for LocalStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::io_error(parent, e))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| Self::io_error(&path, e))
    }

    async fn promote(&self, staging_key: &str, final_key: &str) -> Result<(), StoreError> {
        let from = self.root.join(staging_key);
        let to = self.root.join(final_key);
        // rename is atomic within one filesystem, so readers of the final
        // key never see a partial document.
        tokio::fs::rename(&from, &to)
            .await
            .map_err(|e| Self::io_error(&from, e))
    }
}

/// In-memory store recording every operation, for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    objects: HashMap<String, Vec<u8>>,
    operations: Vec<String>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the bytes stored under `key`, if any.
    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.lock().unwrap().objects.get(key).cloned()
    }

    /// Returns the operations performed so far, in order, as
    /// `"put <key>"` / `"promote <from> -> <to>"` entries.
    pub fn operations(&self) -> Vec<String> {
        self.inner.lock().unwrap().operations.clone()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.objects.insert(key.to_string(), bytes.to_vec());
        inner.operations.push(format!("put {key}"));
        Ok(())
    }

    async fn promote(&self, staging_key: &str, final_key: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let bytes = inner
            .objects
            .remove(staging_key)
            .ok_or_else(|| StoreError::Rejected {
                status: 404,
                message: format!("no staging object '{staging_key}'"),
            })?;
        inner.objects.insert(final_key.to_string(), bytes);
        inner
            .operations
            .push(format!("promote {staging_key} -> {final_key}"));
        Ok(())
    }
}

/// Whether the final object is replaced directly or via a staging key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishMode {
    /// One unconditional write to the final key. The historical behavior:
    /// last writer wins, no partial-write protection.
    #[default]
    Overwrite,

    /// Write to `<key>.tmp`, then promote onto the final key.
    Staged,
}

/// Errors produced while publishing a snapshot.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The snapshot could not be serialized.
    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The storage write failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Serializes the aggregated snapshot and writes it to one well-known
/// object.
pub struct Publisher {
    store: Box<dyn SnapshotStore>,
    object_key: String,
    mode: PublishMode,
}

impl Publisher {
    /// Creates a publisher writing to `object_key` in overwrite mode.
    pub fn new(store: Box<dyn SnapshotStore>, object_key: &str) -> Self {
        Self {
            store,
            object_key: object_key.to_string(),
            mode: PublishMode::default(),
        }
    }

    /// Selects the publish mode.
    pub fn with_mode(mut self, mode: PublishMode) -> Self {
        self.mode = mode;
        self
    }

    /// Writes the complete snapshot, replacing the previous document.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] if serialization or the storage write
    /// fails; the run is then considered failed even though extraction
    /// succeeded.
    pub async fn publish(&self, snapshot: &AggregatedSnapshot) -> Result<(), PublishError> {
        let bytes = snapshot.to_json()?;

        match self.mode {
            PublishMode::Overwrite => {
                self.store.put(&self.object_key, &bytes).await?;
            }
            PublishMode::Staged => {
                let staging_key = format!("{}.tmp", self.object_key);
                self.store.put(&staging_key, &bytes).await?;
                self.store.promote(&staging_key, &self.object_key).await?;
            }
        }

        info!(
            key = %self.object_key,
            projects = snapshot.len(),
            size = bytes.len(),
            mode = ?self.mode,
            "Published snapshot"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Family;
    use crate::snapshot::VersionField;

    fn sample_snapshot() -> AggregatedSnapshot {
        let mut snapshot = AggregatedSnapshot::new();
        snapshot
            .entry("go", Family::Agent)
            .assign(VersionField::Latest, "2.4.0".to_string());
        snapshot
    }

    #[tokio::test]
    async fn overwrite_replaces_previous_content() {
        let store = MemoryStore::new();
        store.put("versions.json", b"old").await.unwrap();

        let publisher = Publisher::new(Box::new(store.clone()), "versions.json");
        publisher.publish(&sample_snapshot()).await.unwrap();

        assert_eq!(
            store.object("versions.json").unwrap(),
            br#"{"go":{"latest_version":"2.4.0"}}"#
        );
        assert_eq!(store.operations(), ["put versions.json", "put versions.json"]);
    }

    #[tokio::test]
    async fn staged_mode_stages_then_promotes() {
        let store = MemoryStore::new();
        let publisher = Publisher::new(Box::new(store.clone()), "versions.json")
            .with_mode(PublishMode::Staged);

        publisher.publish(&sample_snapshot()).await.unwrap();

        assert_eq!(
            store.operations(),
            [
                "put versions.json.tmp",
                "promote versions.json.tmp -> versions.json",
            ]
        );
        assert!(store.object("versions.json").is_some());
        assert!(store.object("versions.json.tmp").is_none());
    }

    #[tokio::test]
    async fn local_store_staged_publish_leaves_no_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        let publisher =
            Publisher::new(Box::new(store), "versions.json").with_mode(PublishMode::Staged);

        publisher.publish(&sample_snapshot()).await.unwrap();

        let published = std::fs::read(dir.path().join("versions.json")).unwrap();
        assert_eq!(published, br#"{"go":{"latest_version":"2.4.0"}}"#);
        assert!(!dir.path().join("versions.json.tmp").exists());
    }

    #[tokio::test]
    async fn local_store_put_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());

        store.put("nested/versions.json", b"{}").await.unwrap();

        assert_eq!(
            std::fs::read(dir.path().join("nested/versions.json")).unwrap(),
            b"{}"
        );
    }

    #[tokio::test]
    async fn promote_without_staging_object_is_rejected() {
        let store = MemoryStore::new();
        let result = store.promote("missing.tmp", "versions.json").await;
        assert!(matches!(result, Err(StoreError::Rejected { status: 404, .. })));
    }
}
