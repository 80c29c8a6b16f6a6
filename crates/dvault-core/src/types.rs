use serde::{Deserialize, Serialize};

/// A document record before the metadata store has assigned its id.
///
/// Field names serialize in the metadata-store wire shape (camelCase).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDocument {
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: u64,
    /// Opaque locator of the ciphertext in the blob store
    pub blob_path: String,
    /// SHA-256 of the plaintext (hex, 32 bytes)
    pub content_hash: String,
    /// HMAC-SHA256 of the ciphertext (hex, 32 bytes)
    pub hmac: String,
    pub hmac_key: String,
    /// Detached signature over the plaintext (base64)
    pub signature: String,
    /// SPKI PEM of the key that produced `signature`
    pub public_key: String,
    pub encryption_key: String,
    pub encryption_nonce: String,
    pub auth_tag: String,
    pub uploader_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_id: Option<i64>,
}

impl NewDocument {
    pub fn into_record(self, id: i64) -> DocumentRecord {
        DocumentRecord {
            id,
            filename: self.filename,
            mime_type: self.mime_type,
            size_bytes: self.size_bytes,
            blob_path: self.blob_path,
            content_hash: self.content_hash,
            hmac: self.hmac,
            hmac_key: self.hmac_key,
            signature: self.signature,
            public_key: self.public_key,
            encryption_key: self.encryption_key,
            encryption_nonce: self.encryption_nonce,
            auth_tag: self.auth_tag,
            uploader_id: self.uploader_id,
            question_id: self.question_id,
        }
    }
}

/// A persisted, write-once document record.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: i64,
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub blob_path: String,
    pub content_hash: String,
    pub hmac: String,
    pub hmac_key: String,
    pub signature: String,
    pub public_key: String,
    pub encryption_key: String,
    pub encryption_nonce: String,
    pub auth_tag: String,
    pub uploader_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_id: Option<i64>,
}

impl DocumentRecord {
    pub fn descriptor(&self) -> DocumentDescriptor {
        DocumentDescriptor {
            id: self.id,
            filename: self.filename.clone(),
            size: self.size_bytes,
            mime_type: self.mime_type.clone(),
        }
    }
}

// Key material stays out of logs.
impl std::fmt::Debug for DocumentRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentRecord")
            .field("id", &self.id)
            .field("filename", &self.filename)
            .field("mime_type", &self.mime_type)
            .field("size_bytes", &self.size_bytes)
            .field("blob_path", &self.blob_path)
            .field("content_hash", &self.content_hash)
            .field("uploader_id", &self.uploader_id)
            .field("question_id", &self.question_id)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for NewDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewDocument")
            .field("filename", &self.filename)
            .field("size_bytes", &self.size_bytes)
            .field("blob_path", &self.blob_path)
            .field("uploader_id", &self.uploader_id)
            .finish_non_exhaustive()
    }
}

/// What `upload` hands back to the forum layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDescriptor {
    pub id: i64,
    pub filename: String,
    pub size: u64,
    pub mime_type: String,
}

/// Descriptive fields supplied with an upload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetadata {
    pub filename: String,
    pub mime_type: String,
    #[serde(default)]
    pub question_id: Option<i64>,
}

/// Fully verified plaintext returned by `download`
#[derive(Clone, PartialEq, Eq)]
pub struct DownloadedDocument {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub mime_type: String,
}

impl std::fmt::Debug for DownloadedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadedDocument")
            .field("bytes", &self.bytes.len())
            .field("filename", &self.filename)
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

/// Approval state of a forum user, as reported by the user-state collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStatus {
    pub approved: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NewDocument {
        NewDocument {
            filename: "notes.pdf".into(),
            mime_type: "application/pdf".into(),
            size_bytes: 10,
            blob_path: "documents/abc".into(),
            content_hash: "00".repeat(32),
            hmac: "11".repeat(32),
            hmac_key: "22".repeat(32),
            signature: "c2ln".into(),
            public_key: "-----BEGIN PUBLIC KEY-----".into(),
            encryption_key: "33".repeat(32),
            encryption_nonce: "44".repeat(12),
            auth_tag: "55".repeat(16),
            uploader_id: 1,
            question_id: Some(9),
        }
    }

    #[test]
    fn record_serializes_camel_case() {
        let record = sample().into_record(42);
        let json = serde_json::to_string(&record).unwrap();
        for field in [
            "\"id\"",
            "\"mimeType\"",
            "\"sizeBytes\"",
            "\"blobPath\"",
            "\"contentHash\"",
            "\"hmacKey\"",
            "\"publicKey\"",
            "\"encryptionKey\"",
            "\"encryptionNonce\"",
            "\"authTag\"",
            "\"uploaderId\"",
            "\"questionId\"",
        ] {
            assert!(json.contains(field), "missing {field} in {json}");
        }
    }

    #[test]
    fn question_id_is_optional() {
        let mut doc = sample();
        doc.question_id = None;
        let json = serde_json::to_string(&doc.into_record(1)).unwrap();
        assert!(!json.contains("questionId"));
    }

    #[test]
    fn debug_redacts_key_material() {
        let record = sample().into_record(1);
        let debug = format!("{record:?}");
        assert!(!debug.contains(&"33".repeat(32)));
        assert!(!debug.contains(&"22".repeat(32)));
    }

    #[test]
    fn descriptor_copies_descriptive_fields() {
        let d = sample().into_record(5).descriptor();
        assert_eq!(d.id, 5);
        assert_eq!(d.filename, "notes.pdf");
        assert_eq!(d.size, 10);
        assert_eq!(d.mime_type, "application/pdf");
    }
}
