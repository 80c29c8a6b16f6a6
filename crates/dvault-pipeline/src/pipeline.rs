//! Document pipeline: encrypted upload, gated and verified download
//!
//! The record's hex/base64 fields are decoded here and nowhere else. A field
//! that fails to decode counts as tampering of the gate that consumes it.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use dvault_core::config::UploadConfig;
use dvault_core::{
    DocumentDescriptor, DocumentRecord, DownloadedDocument, NewDocument, UploadMetadata,
    VaultError, VaultResult,
};
use dvault_crypto::{HmacKey, KeyManager, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
use dvault_storage::{BlobStore, MetadataStore};

use crate::access::UserState;

/// Orchestrates the crypto primitives and the two stores.
///
/// Cheap to clone; all clones share the same key manager and stores.
#[derive(Clone)]
pub struct DocumentPipeline {
    keys: Arc<KeyManager>,
    blobs: BlobStore,
    metadata: Arc<dyn MetadataStore>,
    users: Arc<dyn UserState>,
    max_upload_bytes: u64,
}

impl DocumentPipeline {
    pub fn new(
        keys: Arc<KeyManager>,
        blobs: BlobStore,
        metadata: Arc<dyn MetadataStore>,
        users: Arc<dyn UserState>,
    ) -> Self {
        Self {
            keys,
            blobs,
            metadata,
            users,
            max_upload_bytes: dvault_core::config::DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_upload_config(mut self, cfg: &UploadConfig) -> Self {
        self.max_upload_bytes = cfg.max_bytes;
        self
    }

    pub fn with_max_upload_bytes(mut self, max: u64) -> Self {
        self.max_upload_bytes = max;
        self
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    pub fn keys(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    /// Encrypt, fingerprint, sign and persist a document.
    ///
    /// The blob is written before the record. If the record write fails the
    /// blob is deleted again (best effort) and `Storage` is returned, so no
    /// record ever points at a missing blob.
    pub async fn upload(
        &self,
        bytes: &[u8],
        uploader_id: i64,
        meta: UploadMetadata,
    ) -> VaultResult<DocumentDescriptor> {
        self.validate_upload(bytes)?;

        let key_pair = self.keys.ensure_key_pair().await?;

        let sealed = dvault_crypto::encrypt(bytes)?;
        let content_hash = dvault_crypto::content_hash(bytes);
        let hmac_key = HmacKey::generate();
        let hmac = dvault_crypto::compute_hmac(&sealed.ciphertext, hmac_key.as_bytes())?;
        let signature = dvault_crypto::sign(bytes, key_pair.signing_key());

        let document = NewDocument {
            filename: meta.filename,
            mime_type: meta.mime_type,
            size_bytes: bytes.len() as u64,
            blob_path: String::new(),
            content_hash,
            hmac,
            hmac_key: hex::encode(hmac_key.as_bytes()),
            signature: BASE64.encode(signature),
            public_key: key_pair.public_key_pem().to_string(),
            encryption_key: hex::encode(sealed.key.as_bytes()),
            encryption_nonce: hex::encode(sealed.nonce),
            auth_tag: hex::encode(sealed.tag),
            uploader_id,
            question_id: meta.question_id,
        };

        let blob_path = self.blobs.put(sealed.ciphertext).await?;
        let document = NewDocument {
            blob_path: blob_path.clone(),
            ..document
        };
        let filename = document.filename.clone();
        let mime_type = document.mime_type.clone();
        let size = document.size_bytes;

        let id = match self.metadata.create(document).await {
            Ok(id) => id,
            Err(e) => {
                self.discard_orphan(&blob_path).await;
                return Err(match e {
                    VaultError::Storage(_) => e,
                    other => VaultError::Storage(format!("metadata write failed: {other}")),
                });
            }
        };

        info!(
            id,
            uploader = uploader_id,
            bytes = size,
            blob = %blob_path,
            "document uploaded"
        );

        Ok(DocumentDescriptor {
            id,
            filename,
            size,
            mime_type,
        })
    }

    /// Fetch, verify and decrypt a document for `requester_id`.
    ///
    /// The access gate runs before the blob store is touched. Plaintext is
    /// only returned once every integrity and authenticity check has passed.
    pub async fn download(
        &self,
        document_id: i64,
        requester_id: i64,
    ) -> VaultResult<DownloadedDocument> {
        let record = self.record(document_id).await?;
        self.check_access(requester_id).await?;

        let ciphertext = self.blobs.get(&record.blob_path).await?;
        let mut report = VerificationReport::pending(&record);
        let plaintext = open_record(&record, &ciphertext, &mut report).map_err(|e| {
            warn!(id = document_id, kind = e.kind(), "download rejected: {e}");
            e
        })?;

        debug!(id = document_id, requester = requester_id, "document downloaded");
        Ok(DownloadedDocument {
            bytes: plaintext,
            filename: record.filename,
            mime_type: record.mime_type,
        })
    }

    /// Run every download verification gate without the access gate and
    /// without returning plaintext.
    ///
    /// Gate failures are reported, not returned; only a missing record or an
    /// unreachable store is an `Err`.
    pub async fn verify(&self, document_id: i64) -> VaultResult<VerificationReport> {
        let record = self.record(document_id).await?;
        let ciphertext = self.blobs.get(&record.blob_path).await?;

        let mut report = VerificationReport::pending(&record);
        if let Err(e) = open_record(&record, &ciphertext, &mut report) {
            report.failure = Some(e.to_string());
            report.failure_kind = Some(e.kind());
        }
        Ok(report)
    }

    /// Remove every document attached to a question.
    ///
    /// Records go first so nothing can be downloaded mid-purge; blob deletes
    /// that fail afterwards only leave unreachable ciphertext behind.
    pub async fn delete_for_question(&self, question_id: i64) -> VaultResult<usize> {
        let records = self.metadata.list_for_question(question_id).await?;
        let mut removed = 0;
        for record in records {
            if !self.metadata.delete(record.id).await? {
                continue;
            }
            removed += 1;
            self.discard_orphan(&record.blob_path).await;
        }
        info!(question = question_id, removed, "question documents deleted");
        Ok(removed)
    }

    fn validate_upload(&self, bytes: &[u8]) -> VaultResult<()> {
        if bytes.is_empty() {
            return Err(VaultError::Validation("document is empty".into()));
        }
        let len = bytes.len() as u64;
        if len > self.max_upload_bytes {
            return Err(VaultError::Validation(format!(
                "document is {len} bytes, limit is {}",
                self.max_upload_bytes
            )));
        }
        Ok(())
    }

    async fn record(&self, document_id: i64) -> VaultResult<DocumentRecord> {
        self.metadata
            .get(document_id)
            .await?
            .ok_or(VaultError::NotFound(document_id))
    }

    async fn check_access(&self, requester_id: i64) -> VaultResult<()> {
        match self.users.get(requester_id).await? {
            Some(status) if status.approved => Ok(()),
            _ => {
                warn!(requester = requester_id, "download denied: user not approved");
                Err(VaultError::AccessDenied(requester_id))
            }
        }
    }

    async fn discard_orphan(&self, blob_path: &str) {
        if let Err(e) = self.blobs.delete(blob_path).await {
            error!(blob = %blob_path, "failed to delete blob, left orphaned: {e}");
        }
    }
}

impl std::fmt::Debug for DocumentPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentPipeline")
            .field("keys", &self.keys)
            .field("blobs", &self.blobs)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish_non_exhaustive()
    }
}

/// Outcome of one verification gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Passed,
    Failed,
    /// Not reached because an earlier gate failed
    Skipped,
}

/// Per-gate result of [`DocumentPipeline::verify`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub document_id: i64,
    pub filename: String,
    pub size_bytes: u64,
    pub hmac: CheckStatus,
    pub decrypt: CheckStatus,
    pub content_hash: CheckStatus,
    pub signature: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl VerificationReport {
    fn pending(record: &DocumentRecord) -> Self {
        Self {
            document_id: record.id,
            filename: record.filename.clone(),
            size_bytes: record.size_bytes,
            hmac: CheckStatus::Skipped,
            decrypt: CheckStatus::Skipped,
            content_hash: CheckStatus::Skipped,
            signature: CheckStatus::Skipped,
            failure_kind: None,
            failure: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        [self.hmac, self.decrypt, self.content_hash, self.signature]
            .iter()
            .all(|s| *s == CheckStatus::Passed)
    }
}

/// The download gates in order: HMAC, authenticated decrypt, content hash,
/// signature. Marks each gate in `report` as it is decided.
fn open_record(
    record: &DocumentRecord,
    ciphertext: &[u8],
    report: &mut VerificationReport,
) -> VaultResult<Vec<u8>> {
    let hmac_ok = hex::decode(&record.hmac_key)
        .map(|key| dvault_crypto::verify_hmac(ciphertext, &key, &record.hmac))
        .unwrap_or(false);
    if !hmac_ok {
        report.hmac = CheckStatus::Failed;
        return Err(VaultError::IntegrityFailure(
            "ciphertext HMAC does not match".into(),
        ));
    }
    report.hmac = CheckStatus::Passed;

    let plaintext = decode_fixed::<KEY_SIZE>("encryptionKey", &record.encryption_key)
        .and_then(|key| {
            let nonce = decode_fixed::<NONCE_SIZE>("encryptionNonce", &record.encryption_nonce)?;
            let tag = decode_fixed::<TAG_SIZE>("authTag", &record.auth_tag)?;
            dvault_crypto::decrypt(ciphertext, &key, &nonce, &tag)
        })
        .map_err(|e| {
            report.decrypt = CheckStatus::Failed;
            e
        })?;
    report.decrypt = CheckStatus::Passed;

    let actual = dvault_crypto::content_hash(&plaintext);
    if !actual.eq_ignore_ascii_case(&record.content_hash) {
        report.content_hash = CheckStatus::Failed;
        return Err(VaultError::HashMismatch {
            expected: record.content_hash.clone(),
            actual,
        });
    }
    report.content_hash = CheckStatus::Passed;

    let signature_ok = BASE64
        .decode(&record.signature)
        .map(|sig| dvault_crypto::verify(&plaintext, &sig, &record.public_key))
        .unwrap_or(false);
    if !signature_ok {
        report.signature = CheckStatus::Failed;
        return Err(VaultError::SignatureInvalid);
    }
    report.signature = CheckStatus::Passed;

    Ok(plaintext)
}

fn decode_fixed<const N: usize>(field: &str, value: &str) -> VaultResult<[u8; N]> {
    let bytes = hex::decode(value)
        .map_err(|e| VaultError::IntegrityFailure(format!("{field} is not valid hex: {e}")))?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        VaultError::IntegrityFailure(format!("{field} is {} bytes, expected {N}", b.len()))
    })
}
