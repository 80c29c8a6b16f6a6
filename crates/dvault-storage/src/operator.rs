//! OpenDAL Operator factory for the blob store backends

use opendal::{Builder, Operator};
use secrecy::{ExposeSecret, SecretString};

use dvault_core::config::{StorageBackend, StorageConfig};
use dvault_core::{VaultError, VaultResult};

/// S3 access credentials
#[derive(Debug, Clone)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: SecretString,
}

impl S3Credentials {
    /// Read `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`; `None` if unset.
    pub fn from_env() -> Option<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID").ok()?;
        if access_key_id.is_empty() {
            return None;
        }
        let secret = std::env::var("AWS_SECRET_ACCESS_KEY").unwrap_or_default();
        Some(Self {
            access_key_id,
            secret_access_key: SecretString::from(secret),
        })
    }
}

/// Build an operator for the configured backend.
///
/// S3 uses path-style addressing (the opendal default), which MinIO and
/// SeaweedFS require. If `enforce_tls` is set, a plaintext HTTP endpoint is
/// rejected; otherwise it is only warned about. No retry layer is installed:
/// every blob operation runs exactly once.
pub fn build_operator(
    cfg: &StorageConfig,
    credentials: Option<&S3Credentials>,
) -> VaultResult<Operator> {
    match cfg.backend {
        StorageBackend::S3 => {
            check_endpoint_tls(cfg)?;
            let mut builder = opendal::services::S3::default()
                .endpoint(&cfg.endpoint)
                .region(&cfg.region)
                .bucket(&cfg.bucket);
            if let Some(creds) = credentials {
                builder = builder
                    .access_key_id(&creds.access_key_id)
                    .secret_access_key(creds.secret_access_key.expose_secret());
            } else {
                tracing::warn!("no S3 credentials in environment, relying on ambient config");
            }
            finish(builder)
        }
        StorageBackend::Fs => {
            let root = cfg.root.to_string_lossy();
            finish(opendal::services::Fs::default().root(&root))
        }
        StorageBackend::Memory => {
            tracing::warn!("memory blob backend: ciphertext is lost on exit");
            finish(opendal::services::Memory::default())
        }
    }
}

fn finish<B: Builder>(builder: B) -> VaultResult<Operator> {
    let op = Operator::new(builder)
        .map_err(|e| VaultError::Storage(format!("creating OpenDAL operator: {e}")))?
        .layer(opendal::layers::LoggingLayer::default())
        .finish();
    Ok(op)
}

fn check_endpoint_tls(cfg: &StorageConfig) -> VaultResult<()> {
    if cfg.endpoint.starts_with("http://") {
        if cfg.enforce_tls {
            return Err(VaultError::Config(format!(
                "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                 Use an HTTPS endpoint or set storage.enforce_tls = false for local development.",
                cfg.endpoint
            )));
        }
        tracing::warn!(
            endpoint = %cfg.endpoint,
            "S3 endpoint uses plaintext HTTP; set storage.enforce_tls = true and use HTTPS in production"
        );
    }
    Ok(())
}
