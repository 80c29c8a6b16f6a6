//! Document metadata store
//!
//! Records are write-once: there is no update. Two backends:
//!   - **memory**: `BTreeMap` behind an async lock (tests, ephemeral runs)
//!   - **JSON file**: same map mirrored to disk, flushed atomically via
//!     temp+rename on every create/delete; a failed flush rolls the change back

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use dvault_core::{DocumentRecord, NewDocument, VaultError, VaultResult};

/// Relational-style persistence of document records.
///
/// `create` is atomic and assigns the id; `get` after `create` is immediately
/// consistent. Implementations must be safe for concurrent use.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn create(&self, document: NewDocument) -> VaultResult<i64>;

    async fn get(&self, id: i64) -> VaultResult<Option<DocumentRecord>>;

    /// Remove a whole record. Returns `false` if it did not exist.
    async fn delete(&self, id: i64) -> VaultResult<bool>;

    async fn list_for_question(&self, question_id: i64) -> VaultResult<Vec<DocumentRecord>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Records {
    next_id: i64,
    documents: BTreeMap<i64, DocumentRecord>,
}

impl Default for Records {
    fn default() -> Self {
        Self {
            next_id: 1,
            documents: BTreeMap::new(),
        }
    }
}

impl Records {
    fn insert(&mut self, document: NewDocument) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        self.documents.insert(id, document.into_record(id));
        id
    }

    fn for_question(&self, question_id: i64) -> Vec<DocumentRecord> {
        self.documents
            .values()
            .filter(|r| r.question_id == Some(question_id))
            .cloned()
            .collect()
    }
}

/// In-memory metadata store
#[derive(Default)]
pub struct MemoryMetadataStore {
    records: RwLock<Records>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.documents.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn create(&self, document: NewDocument) -> VaultResult<i64> {
        Ok(self.records.write().await.insert(document))
    }

    async fn get(&self, id: i64) -> VaultResult<Option<DocumentRecord>> {
        Ok(self.records.read().await.documents.get(&id).cloned())
    }

    async fn delete(&self, id: i64) -> VaultResult<bool> {
        Ok(self.records.write().await.documents.remove(&id).is_some())
    }

    async fn list_for_question(&self, question_id: i64) -> VaultResult<Vec<DocumentRecord>> {
        Ok(self.records.read().await.for_question(question_id))
    }
}

/// Metadata store persisted to a single JSON file
pub struct JsonMetadataStore {
    path: PathBuf,
    records: Mutex<Records>,
}

impl JsonMetadataStore {
    /// Load or create a store at the given path.
    /// If the file doesn't exist, starts empty (the file appears on first write).
    pub async fn open(path: &Path) -> VaultResult<Self> {
        let records = if path.exists() {
            let content = tokio::fs::read_to_string(path).await.map_err(|e| {
                VaultError::Storage(format!("reading metadata {}: {e}", path.display()))
            })?;
            serde_json::from_str(&content).map_err(|e| {
                VaultError::Storage(format!("parsing metadata {}: {e}", path.display()))
            })?
        } else {
            Records::default()
        };

        Ok(Self {
            path: path.to_path_buf(),
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, records: &Records) -> VaultResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                VaultError::Storage(format!("creating metadata dir {}: {e}", parent.display()))
            })?;
        }

        let json = serde_json::to_string_pretty(records)
            .map_err(|e| VaultError::Storage(format!("serializing metadata: {e}")))?;

        // Atomic write: write to temp file, then rename
        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, json.as_bytes())
            .await
            .map_err(|e| {
                VaultError::Storage(format!("writing metadata temp {}: {e}", tmp_path.display()))
            })?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| {
                VaultError::Storage(format!("renaming metadata {}: {e}", self.path.display()))
            })
    }
}

#[async_trait]
impl MetadataStore for JsonMetadataStore {
    async fn create(&self, document: NewDocument) -> VaultResult<i64> {
        let mut records = self.records.lock().await;
        let previous_next = records.next_id;
        let id = records.insert(document);
        if let Err(e) = self.flush(&records).await {
            records.documents.remove(&id);
            records.next_id = previous_next;
            return Err(e);
        }
        debug!(id, path = %self.path.display(), "metadata record created");
        Ok(id)
    }

    async fn get(&self, id: i64) -> VaultResult<Option<DocumentRecord>> {
        Ok(self.records.lock().await.documents.get(&id).cloned())
    }

    async fn delete(&self, id: i64) -> VaultResult<bool> {
        let mut records = self.records.lock().await;
        let Some(removed) = records.documents.remove(&id) else {
            return Ok(false);
        };
        if let Err(e) = self.flush(&records).await {
            records.documents.insert(id, removed);
            return Err(e);
        }
        debug!(id, "metadata record deleted");
        Ok(true)
    }

    async fn list_for_question(&self, question_id: i64) -> VaultResult<Vec<DocumentRecord>> {
        Ok(self.records.lock().await.for_question(question_id))
    }
}
