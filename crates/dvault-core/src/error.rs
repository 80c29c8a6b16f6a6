use thiserror::Error;

pub type VaultResult<T> = Result<T, VaultError>;

/// Every failure the document vault reports to its caller.
///
/// Storage-library errors are flattened into `Storage` at the store boundary;
/// there is deliberately no catch-all variant.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Bad input size or shape (caller's fault)
    #[error("validation error: {0}")]
    Validation(String),

    #[error("document {0} not found")]
    NotFound(i64),

    #[error("access denied for user {0}")]
    AccessDenied(i64),

    /// HMAC or AEAD tag check failed: ciphertext tampered or corrupted
    #[error("integrity failure: {0}")]
    IntegrityFailure(String),

    /// Plaintext hash differs after a successful decrypt (key material corruption)
    #[error("content hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("signature does not verify")]
    SignatureInvalid,

    #[error("key generation error: {0}")]
    KeyGeneration(String),

    /// Blob or metadata store unreachable, failed, or timed out
    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),
}

impl VaultError {
    /// Short stable name of the error kind, for logs and diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            VaultError::Validation(_) => "validation",
            VaultError::NotFound(_) => "not_found",
            VaultError::AccessDenied(_) => "access_denied",
            VaultError::IntegrityFailure(_) => "integrity_failure",
            VaultError::HashMismatch { .. } => "hash_mismatch",
            VaultError::SignatureInvalid => "signature_invalid",
            VaultError::KeyGeneration(_) => "key_generation",
            VaultError::Storage(_) => "storage",
            VaultError::Config(_) => "config",
        }
    }
}
