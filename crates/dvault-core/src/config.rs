use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{VaultError, VaultResult};

/// Size ceiling observed in the forum deployment: 5 MiB
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

/// Top-level configuration (loaded from dvault.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub storage: StorageConfig,
    pub metadata: MetadataConfig,
    pub keys: KeyConfig,
    pub upload: UploadConfig,
    pub access: AccessConfig,
    pub log: LogConfig,
}

impl VaultConfig {
    /// Load configuration from a TOML file; a missing file yields defaults.
    pub fn load(path: &Path) -> VaultResult<Self> {
        if !path.exists() {
            tracing::warn!("config file not found: {}  (using defaults)", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| VaultError::Config(format!("reading {}: {e}", path.display())))?;
        Self::parse(&content)
            .map_err(|e| VaultError::Config(format!("parsing {}: {e}", path.display())))
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// Which OpenDAL service backs the blob store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    S3,
    Fs,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// S3 endpoint (backend = "s3")
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    pub bucket: String,
    /// Root directory for backend = "fs"
    pub root: PathBuf,
    /// Path prefix under which ciphertext blobs are written
    pub prefix: String,
    /// Enforce HTTPS for S3 connections (error on HTTP endpoints)
    pub enforce_tls: bool,
    /// Upper bound on every blob round trip, in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// JSON file holding document records
    pub path: PathBuf,
}

/// What to do when the signing key pair is missing on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyPolicy {
    /// Generate a fresh pair on first use
    Generate,
    /// Missing keys are fatal (production: avoids accidental rotation)
    Require,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    pub private_key_path: PathBuf,
    pub public_key_path: PathBuf,
    pub policy: KeyPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub max_bytes: u64,
    /// MIME types callers should accept before handing a file to the vault
    pub allowed_mime_types: Vec<String>,
}

impl UploadConfig {
    /// Allow-list check for callers. An empty list allows everything.
    pub fn is_allowed_mime(&self, mime_type: &str) -> bool {
        if self.allowed_mime_types.is_empty() {
            return true;
        }
        let mime = mime_type.trim().to_ascii_lowercase();
        self.allowed_mime_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&mime))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// User ids treated as approved by the static user-state provider
    pub approved_users: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Fs,
            endpoint: "http://localhost:9000".into(),
            region: "us-east-1".into(),
            bucket: "dvault".into(),
            root: PathBuf::from("/var/lib/dvault/blobs"),
            prefix: "documents".into(),
            enforce_tls: false,
            timeout_secs: 30,
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/dvault/documents.json"),
        }
    }
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            private_key_path: PathBuf::from("/var/lib/dvault/keys/signing.pem"),
            public_key_path: PathBuf::from("/var/lib/dvault/keys/signing.pub.pem"),
            policy: KeyPolicy::Generate,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_mime_types: vec![
                "application/pdf".into(),
                "text/plain".into(),
                "image/png".into(),
                "image/jpeg".into(),
            ],
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}
