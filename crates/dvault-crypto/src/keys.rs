//! Key material: per-document secrets and the deployment signing key pair
//!
//! The signing key pair lives on disk as PEM:
//!   - private: PKCS#8, mode 0600, created atomically (temp file + hard link)
//!   - public:  SPKI, derived from the private key and rewritten if missing
//!
//! One pair signs every document. Within a process the pair is loaded at most
//! once; across processes the hard link makes concurrent first use converge on
//! a single winner.

use ed25519_dalek::pkcs8::{
    DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey,
};
use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::RngCore;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};
use zeroize::Zeroize;

use dvault_core::config::{KeyConfig, KeyPolicy};
use dvault_core::{VaultError, VaultResult};

use crate::{HMAC_KEY_SIZE, KEY_SIZE};

/// A per-document 256-bit AES key. Zeroized on drop.
#[derive(Clone)]
pub struct DocumentKey {
    bytes: [u8; KEY_SIZE],
}

impl DocumentKey {
    pub(crate) fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for DocumentKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for DocumentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A per-document 256-bit HMAC key. Zeroized on drop.
#[derive(Clone)]
pub struct HmacKey {
    bytes: [u8; HMAC_KEY_SIZE],
}

impl HmacKey {
    /// Generate a random HMAC key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; HMAC_KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; HMAC_KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for HmacKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for HmacKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// The deployment-wide Ed25519 signing key pair.
pub struct SigningKeyPair {
    signing_key: SigningKey,
    public_key_pem: String,
}

impl SigningKeyPair {
    fn from_signing_key(signing_key: SigningKey) -> VaultResult<Self> {
        let public_key_pem = signing_key
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| VaultError::KeyGeneration(format!("encoding public key: {e}")))?;
        Ok(Self {
            signing_key,
            public_key_pem,
        })
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// SPKI PEM stored alongside every document signed with this pair
    pub fn public_key_pem(&self) -> &str {
        &self.public_key_pem
    }
}

impl std::fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("signing_key", &"[REDACTED]")
            .field("public_key_pem", &self.public_key_pem)
            .finish()
    }
}

/// Ensures the signing key pair exists and hands out a shared, read-only copy.
pub struct KeyManager {
    private_key_path: PathBuf,
    public_key_path: PathBuf,
    policy: KeyPolicy,
    pair: OnceCell<Arc<SigningKeyPair>>,
}

impl KeyManager {
    pub fn new(
        private_key_path: impl Into<PathBuf>,
        public_key_path: impl Into<PathBuf>,
        policy: KeyPolicy,
    ) -> Self {
        Self {
            private_key_path: private_key_path.into(),
            public_key_path: public_key_path.into(),
            policy,
            pair: OnceCell::new(),
        }
    }

    pub fn from_config(config: &KeyConfig) -> Self {
        Self::new(
            config.private_key_path.clone(),
            config.public_key_path.clone(),
            config.policy,
        )
    }

    pub fn policy(&self) -> KeyPolicy {
        self.policy
    }

    /// Return the key pair, loading it from disk or generating it on first use.
    ///
    /// With `KeyPolicy::Require` a missing private key is a `KeyGeneration`
    /// error instead of a silent rotation.
    pub async fn ensure_key_pair(&self) -> VaultResult<Arc<SigningKeyPair>> {
        self.pair
            .get_or_try_init(|| async { self.load_or_create().map(Arc::new) })
            .await
            .cloned()
    }

    fn load_or_create(&self) -> VaultResult<SigningKeyPair> {
        if self.private_key_path.exists() {
            return self.load_existing();
        }
        match self.policy {
            KeyPolicy::Require => Err(VaultError::KeyGeneration(format!(
                "signing key not found at {} and key policy is `require`",
                self.private_key_path.display()
            ))),
            KeyPolicy::Generate => self.generate_and_persist(),
        }
    }

    fn load_existing(&self) -> VaultResult<SigningKeyPair> {
        let path = &self.private_key_path;
        warn_if_permissive(path);

        let mut pem = std::fs::read_to_string(path)
            .map_err(|e| VaultError::KeyGeneration(format!("reading {}: {e}", path.display())))?;
        let signing_key = SigningKey::from_pkcs8_pem(&pem);
        pem.zeroize();
        let signing_key = signing_key
            .map_err(|e| VaultError::KeyGeneration(format!("parsing {}: {e}", path.display())))?;
        let pair = SigningKeyPair::from_signing_key(signing_key)?;

        if self.public_key_path.exists() {
            let stored = std::fs::read_to_string(&self.public_key_path).map_err(|e| {
                VaultError::KeyGeneration(format!(
                    "reading {}: {e}",
                    self.public_key_path.display()
                ))
            })?;
            let stored_key = VerifyingKey::from_public_key_pem(&stored).map_err(|e| {
                VaultError::KeyGeneration(format!(
                    "parsing {}: {e}",
                    self.public_key_path.display()
                ))
            })?;
            if stored_key != pair.verifying_key() {
                return Err(VaultError::KeyGeneration(format!(
                    "public key {} does not match private key {}",
                    self.public_key_path.display(),
                    path.display()
                )));
            }
        } else {
            warn!(
                path = %self.public_key_path.display(),
                "public key missing, rewriting from private key"
            );
            self.write_public_key(pair.public_key_pem())?;
        }

        info!(path = %path.display(), "signing key pair loaded");
        Ok(pair)
    }

    fn generate_and_persist(&self) -> VaultResult<SigningKeyPair> {
        let path = &self.private_key_path;
        if let Some(parent) = path.parent() {
            create_key_dir(parent)?;
        }

        let signing_key = SigningKey::generate(&mut rand::rngs::OsRng);
        let pem = signing_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| VaultError::KeyGeneration(format!("encoding private key: {e}")))?;

        // Fully written temp file, then hard link: the final path either does
        // not exist or holds a complete key.
        let tmp = temp_path(path);
        write_new_file(&tmp, pem.as_bytes(), 0o600)
            .map_err(|e| VaultError::KeyGeneration(format!("writing {}: {e}", tmp.display())))?;
        let linked = std::fs::hard_link(&tmp, path);
        let _ = std::fs::remove_file(&tmp);

        match linked {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                info!(path = %path.display(), "signing key created concurrently, loading it");
                return self.load_existing();
            }
            Err(e) => {
                return Err(VaultError::KeyGeneration(format!(
                    "installing {}: {e}",
                    path.display()
                )))
            }
        }

        let pair = SigningKeyPair::from_signing_key(signing_key)?;
        self.write_public_key(pair.public_key_pem())?;

        info!(
            private = %path.display(),
            public = %self.public_key_path.display(),
            "generated new signing key pair"
        );
        Ok(pair)
    }

    fn write_public_key(&self, pem: &str) -> VaultResult<()> {
        let path = &self.public_key_path;
        if let Some(parent) = path.parent() {
            create_key_dir(parent)?;
        }
        let tmp = temp_path(path);
        write_new_file(&tmp, pem.as_bytes(), 0o644)
            .and_then(|()| std::fs::rename(&tmp, path))
            .map_err(|e| {
                let _ = std::fs::remove_file(&tmp);
                VaultError::KeyGeneration(format!("writing {}: {e}", path.display()))
            })
    }
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("private_key_path", &self.private_key_path)
            .field("public_key_path", &self.public_key_path)
            .field("policy", &self.policy)
            .field("loaded", &self.pair.initialized())
            .finish()
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or(Path::new("."));
    parent.join(format!(
        ".{}.{:016x}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        rand::random::<u64>()
    ))
}

fn create_key_dir(dir: &Path) -> VaultResult<()> {
    if dir.as_os_str().is_empty() || dir.exists() {
        return Ok(());
    }
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder
        .create(dir)
        .map_err(|e| VaultError::KeyGeneration(format!("creating {}: {e}", dir.display())))
}

fn write_new_file(path: &Path, contents: &[u8], mode: u32) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(unix)]
fn warn_if_permissive(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = std::fs::metadata(path) {
        let mode = meta.permissions().mode();
        if mode & 0o077 != 0 {
            warn!(
                path = %path.display(),
                mode = %format!("{:o}", mode & 0o777),
                "signing key is readable by group/other"
            );
        }
    }
}

#[cfg(not(unix))]
fn warn_if_permissive(_path: &Path) {}
