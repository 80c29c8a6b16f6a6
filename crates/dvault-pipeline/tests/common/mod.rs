//! Shared fixtures for pipeline integration tests
//!
//! Blob store: OpenDAL in-memory service. Keys: a TempDir per harness.
//! Metadata: an in-test store whose records can be edited after creation,
//! standing in for someone with write access to the metadata database.

#![allow(dead_code)]

use async_trait::async_trait;
use opendal::Operator;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use dvault_core::config::KeyPolicy;
use dvault_core::{DocumentRecord, NewDocument, UploadMetadata, VaultError, VaultResult};
use dvault_crypto::KeyManager;
use dvault_pipeline::{DocumentPipeline, StaticUserState};
use dvault_storage::{BlobStore, MetadataStore};

pub const APPROVED: i64 = 1;
pub const NOT_APPROVED: i64 = 2;

pub fn memory_operator() -> Operator {
    Operator::new(opendal::services::Memory::default())
        .expect("memory operator")
        .finish()
}

pub fn memory_blobs() -> BlobStore {
    BlobStore::new(memory_operator(), "documents", Duration::from_secs(5))
}

pub fn key_manager(dir: &Path, policy: KeyPolicy) -> Arc<KeyManager> {
    Arc::new(KeyManager::new(
        dir.join("keys/signing.pem"),
        dir.join("keys/signing.pub.pem"),
        policy,
    ))
}

pub fn meta(filename: &str) -> UploadMetadata {
    UploadMetadata {
        filename: filename.into(),
        mime_type: "text/plain".into(),
        question_id: None,
    }
}

/// Metadata store that lets tests rewrite persisted records.
#[derive(Default)]
pub struct TamperableStore {
    records: Mutex<BTreeMap<i64, DocumentRecord>>,
    creates: AtomicUsize,
}

impl TamperableStore {
    /// Number of `create` calls seen, successful or not
    pub fn create_calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn tamper(&self, id: i64, edit: impl FnOnce(&mut DocumentRecord)) {
        let mut records = self.records.lock().unwrap();
        edit(records.get_mut(&id).expect("record to tamper with"));
    }

    pub fn snapshot(&self, id: i64) -> DocumentRecord {
        self.records.lock().unwrap().get(&id).cloned().expect("record")
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl MetadataStore for TamperableStore {
    async fn create(&self, document: NewDocument) -> VaultResult<i64> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let mut records = self.records.lock().unwrap();
        let id = records.keys().next_back().map_or(1, |last| last + 1);
        records.insert(id, document.into_record(id));
        Ok(id)
    }

    async fn get(&self, id: i64) -> VaultResult<Option<DocumentRecord>> {
        Ok(self.records.lock().unwrap().get(&id).cloned())
    }

    async fn delete(&self, id: i64) -> VaultResult<bool> {
        Ok(self.records.lock().unwrap().remove(&id).is_some())
    }

    async fn list_for_question(&self, question_id: i64) -> VaultResult<Vec<DocumentRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.question_id == Some(question_id))
            .cloned()
            .collect())
    }
}

/// Metadata store whose writes always fail.
pub struct FailingMetadataStore;

#[async_trait]
impl MetadataStore for FailingMetadataStore {
    async fn create(&self, _document: NewDocument) -> VaultResult<i64> {
        Err(VaultError::Storage("metadata database unreachable".into()))
    }

    async fn get(&self, _id: i64) -> VaultResult<Option<DocumentRecord>> {
        Ok(None)
    }

    async fn delete(&self, _id: i64) -> VaultResult<bool> {
        Ok(false)
    }

    async fn list_for_question(&self, _question_id: i64) -> VaultResult<Vec<DocumentRecord>> {
        Ok(Vec::new())
    }
}

pub struct Harness {
    pub pipeline: DocumentPipeline,
    pub store: Arc<TamperableStore>,
    pub dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_blobs(memory_blobs())
    }

    pub fn with_blobs(blobs: BlobStore) -> Self {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(TamperableStore::default());
        let pipeline = DocumentPipeline::new(
            key_manager(dir.path(), KeyPolicy::Generate),
            blobs,
            store.clone(),
            Arc::new(StaticUserState::new([APPROVED])),
        );
        Self {
            pipeline,
            store,
            dir,
        }
    }

    pub async fn upload(&self, bytes: &[u8]) -> i64 {
        self.pipeline
            .upload(bytes, APPROVED, meta("doc.txt"))
            .await
            .expect("upload")
            .id
    }

    pub async fn blob(&self, id: i64) -> Vec<u8> {
        let path = self.store.snapshot(id).blob_path;
        self.pipeline.blobs().get(&path).await.unwrap()
    }

    pub async fn overwrite_blob(&self, id: i64, bytes: Vec<u8>) {
        let path = self.store.snapshot(id).blob_path;
        self.pipeline
            .blobs()
            .operator()
            .write(&path, bytes)
            .await
            .unwrap();
    }
}
