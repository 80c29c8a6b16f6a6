//! Ciphertext blob store over an OpenDAL operator
//!
//! Blobs are opaque: written once under `{prefix}/{uuid}`, read back by the
//! returned path, deleted only for upload compensation or cascade delete.
//! Every round trip is bounded by the configured timeout.

use opendal::Operator;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use dvault_core::config::StorageConfig;
use dvault_core::{VaultError, VaultResult};

/// Lower bound on the cleanup delete after a failed put
const MIN_CLEANUP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct BlobStore {
    op: Operator,
    prefix: String,
    timeout: Duration,
}

impl BlobStore {
    pub fn new(op: Operator, prefix: &str, timeout: Duration) -> Self {
        Self {
            op,
            prefix: prefix.trim_matches('/').to_string(),
            timeout,
        }
    }

    pub fn from_config(op: Operator, cfg: &StorageConfig) -> Self {
        Self::new(op, &cfg.prefix, Duration::from_secs(cfg.timeout_secs))
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Store `bytes` under a fresh path and return that path.
    ///
    /// On failure nothing is left behind under the path: a write that errors
    /// is followed by a delete, and a write that times out keeps running in
    /// the background and is deleted once it settles.
    pub async fn put(&self, bytes: Vec<u8>) -> VaultResult<String> {
        let path = self.new_path();
        let len = bytes.len();
        let op = self.op.clone();
        let target = path.clone();
        let write = tokio::spawn(async move { op.write(&target, bytes).await.map(|_| ()) });
        self.await_write(&path, write).await?;
        debug!(blob = %path, bytes = len, "blob stored");
        Ok(path)
    }

    pub async fn get(&self, path: &str) -> VaultResult<Vec<u8>> {
        let buf = self.bounded("get", path, self.op.read(path)).await?;
        Ok(buf.to_vec())
    }

    pub async fn delete(&self, path: &str) -> VaultResult<()> {
        self.bounded("delete", path, self.op.delete(path)).await?;
        debug!(blob = %path, "blob deleted");
        Ok(())
    }

    pub async fn exists(&self, path: &str) -> VaultResult<bool> {
        self.bounded("exists", path, self.op.exists(path)).await
    }

    fn new_path(&self) -> String {
        let id = uuid::Uuid::new_v4();
        if self.prefix.is_empty() {
            id.to_string()
        } else {
            format!("{}/{id}", self.prefix)
        }
    }

    async fn await_write(
        &self,
        path: &str,
        mut write: JoinHandle<opendal::Result<()>>,
    ) -> VaultResult<()> {
        match tokio::time::timeout(self.timeout, &mut write).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => {
                self.remove_partial(path).await;
                Err(VaultError::Storage(format!("blob put {path}: {e}")))
            }
            Ok(Err(e)) => {
                self.remove_partial(path).await;
                Err(VaultError::Storage(format!("blob put {path}: write task failed: {e}")))
            }
            Err(_) => {
                let store = self.clone();
                let orphan = path.to_string();
                tokio::spawn(async move {
                    let _ = write.await;
                    store.remove_partial(&orphan).await;
                });
                Err(VaultError::Storage(format!(
                    "blob put {path}: timed out after {:?}",
                    self.timeout
                )))
            }
        }
    }

    /// Best-effort delete of a blob whose write did not succeed.
    async fn remove_partial(&self, path: &str) {
        let bound = self.timeout.max(MIN_CLEANUP_TIMEOUT);
        match tokio::time::timeout(bound, self.op.delete(path)).await {
            Ok(Ok(())) => debug!(blob = %path, "removed partially written blob"),
            Ok(Err(e)) => error!(blob = %path, "failed to remove partially written blob: {e}"),
            Err(_) => error!(blob = %path, "timed out removing partially written blob"),
        }
    }

    async fn bounded<T>(
        &self,
        action: &str,
        path: &str,
        fut: impl Future<Output = opendal::Result<T>>,
    ) -> VaultResult<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(VaultError::Storage(format!("blob {action} {path}: {e}"))),
            Err(_) => Err(VaultError::Storage(format!(
                "blob {action} {path}: timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

impl std::fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStore")
            .field("prefix", &self.prefix)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_store(prefix: &str) -> BlobStore {
        let op = Operator::new(opendal::services::Memory::default())
            .expect("memory operator")
            .finish();
        BlobStore::new(op, prefix, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = memory_store("documents");
        let path = store.put(b"ciphertext".to_vec()).await.unwrap();
        assert!(path.starts_with("documents/"));
        assert_eq!(store.get(&path).await.unwrap(), b"ciphertext");
    }

    #[tokio::test]
    async fn test_paths_are_unique() {
        let store = memory_store("documents");
        let a = store.put(b"same".to_vec()).await.unwrap();
        let b = store.put(b"same".to_vec()).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_prefix_slashes_trimmed() {
        let store = memory_store("/nested/docs/");
        let path = store.put(b"x".to_vec()).await.unwrap();
        assert!(path.starts_with("nested/docs/"), "got {path}");

        let bare = memory_store("");
        let path = bare.put(b"x".to_vec()).await.unwrap();
        assert!(!path.contains('/'));
    }

    #[tokio::test]
    async fn test_delete_removes_blob() {
        let store = memory_store("documents");
        let path = store.put(b"gone soon".to_vec()).await.unwrap();
        assert!(store.exists(&path).await.unwrap());
        store.delete(&path).await.unwrap();
        assert!(!store.exists(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_missing_is_storage_error() {
        let store = memory_store("documents");
        let err = store.get("documents/nope").await.unwrap_err();
        assert!(matches!(err, VaultError::Storage(_)));
    }

    async fn stored_files(store: &BlobStore) -> Vec<String> {
        store
            .operator()
            .list_with("")
            .recursive(true)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.metadata().is_file())
            .map(|e| e.path().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_failed_write_that_landed_is_removed() {
        let store = memory_store("documents");
        let op = store.operator().clone();
        let write = tokio::spawn(async move {
            op.write("documents/landed", b"ciphertext".to_vec()).await?;
            Err::<(), _>(opendal::Error::new(
                opendal::ErrorKind::Unexpected,
                "connection reset after upload",
            ))
        });

        let err = store.await_write("documents/landed", write).await.unwrap_err();
        assert!(matches!(err, VaultError::Storage(_)));
        assert!(!store.exists("documents/landed").await.unwrap());
    }

    #[tokio::test]
    async fn test_timed_out_put_leaves_no_blob() {
        let op = Operator::new(opendal::services::Memory::default())
            .unwrap()
            .finish();
        let store = BlobStore::new(op, "documents", Duration::ZERO);

        let err = store.put(b"slow ciphertext".to_vec()).await.unwrap_err();
        assert!(matches!(err, VaultError::Storage(ref m) if m.contains("timed out")));

        // Cleanup runs once the abandoned write settles
        let mut left = stored_files(&store).await;
        for _ in 0..200 {
            if left.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            left = stored_files(&store).await;
        }
        assert!(left.is_empty(), "orphaned blobs: {left:?}");
    }

    #[tokio::test]
    async fn test_elapsed_timeout_maps_to_storage_error() {
        let op = Operator::new(opendal::services::Memory::default())
            .unwrap()
            .finish();
        let store = BlobStore::new(op, "documents", Duration::from_millis(20));
        let result = store
            .bounded("get", "slow", async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, opendal::Error>(())
            })
            .await;
        assert!(matches!(result, Err(VaultError::Storage(ref m)) if m.contains("timed out")));
    }
}
