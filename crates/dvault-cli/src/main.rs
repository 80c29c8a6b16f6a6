//! dvault: DocVault command-line interface
//!
//! Commands:
//!   keygen                        - ensure the signing key pair exists, print the public key
//!   status                        - check blob store reachability and key presence
//!   upload <file> --user <id>     - encrypt, sign and store a document
//!   download <id> --user <id>     - fetch, verify and decrypt a document
//!   verify <id>                   - run every integrity gate, print the report
//!   show <id>                     - print the non-secret fields of a record
//!   purge-question <question-id>  - delete every document attached to a question
//!   config show                   - display current configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use dvault_core::config::VaultConfig;
use dvault_core::UploadMetadata;
use dvault_crypto::KeyManager;
use dvault_pipeline::{DocumentPipeline, StaticUserState};
use dvault_storage::{build_operator, BlobStore, JsonMetadataStore, MetadataStore, S3Credentials};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "dvault",
    version,
    about = "DocVault encrypted document store",
    long_about = "dvault: store forum documents encrypted, HMAC'd and signed; \
                  serve them back only after every check passes"
)]
struct Cli {
    /// Path to the dvault TOML configuration file
    #[arg(long, short = 'c', env = "DVAULT_CONFIG", default_value = "/etc/dvault/config.toml")]
    config: PathBuf,

    /// Log level (overrides [log].level)
    #[arg(long, env = "DVAULT_LOG")]
    log: Option<String>,

    /// Log format (overrides [log].format)
    #[arg(long, env = "DVAULT_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum, PartialEq)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ensure the signing key pair exists and print the public key (PEM)
    Keygen,

    /// Check blob store reachability and signing key presence
    Status,

    /// Encrypt, sign and store a document
    ///
    /// S3 credentials are read from AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY.
    Upload {
        /// Local file to upload
        file: PathBuf,
        /// Uploading user id
        #[arg(long, short = 'u')]
        user: i64,
        /// Question the document is attached to
        #[arg(long, short = 'q')]
        question: Option<i64>,
        /// MIME type (default: guessed from the file extension)
        #[arg(long)]
        mime: Option<String>,
    },

    /// Fetch, verify and decrypt a document
    Download {
        /// Document id
        id: i64,
        /// Requesting user id (must be approved)
        #[arg(long, short = 'u')]
        user: i64,
        /// Destination path (default: original filename in the current directory)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
    },

    /// Run every integrity gate on a stored document and print the report
    Verify {
        /// Document id
        id: i64,
    },

    /// Print the non-secret fields of a document record as JSON
    Show {
        /// Document id
        id: i64,
    },

    /// Delete every document attached to a question
    #[command(name = "purge-question")]
    PurgeQuestion {
        /// Question id
        question_id: i64,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = VaultConfig::load(&cli.config)
        .with_context(|| format!("loading config: {}", cli.config.display()))?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| log_format_from_config(&config.log.format));
    init_logging(&level, &format);

    match cli.command {
        Commands::Keygen => cmd_keygen(&config).await,
        Commands::Status => cmd_status(&config).await,
        Commands::Upload {
            file,
            user,
            question,
            mime,
        } => cmd_upload(&config, &file, user, question, mime).await,
        Commands::Download { id, user, out } => cmd_download(&config, id, user, out).await,
        Commands::Verify { id } => cmd_verify(&config, id).await,
        Commands::Show { id } => cmd_show(&config, id).await,
        Commands::PurgeQuestion { question_id } => cmd_purge_question(&config, question_id).await,
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config),
    }
}

fn log_format_from_config(format: &str) -> LogFormat {
    if format.eq_ignore_ascii_case("json") {
        LogFormat::Json
    } else {
        LogFormat::Text
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries command output; logs go to stderr
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Wiring ─────────────────────────────────────────────────────────────────────

fn blob_store(config: &VaultConfig) -> Result<BlobStore> {
    let credentials = S3Credentials::from_env();
    let op = build_operator(&config.storage, credentials.as_ref())
        .context("building blob store operator")?;
    Ok(BlobStore::from_config(op, &config.storage))
}

async fn metadata_store(config: &VaultConfig) -> Result<Arc<dyn MetadataStore>> {
    let store = JsonMetadataStore::open(&config.metadata.path)
        .await
        .with_context(|| format!("opening metadata: {}", config.metadata.path.display()))?;
    Ok(Arc::new(store))
}

async fn build_pipeline(config: &VaultConfig) -> Result<DocumentPipeline> {
    let pipeline = DocumentPipeline::new(
        Arc::new(KeyManager::from_config(&config.keys)),
        blob_store(config)?,
        metadata_store(config).await?,
        Arc::new(StaticUserState::from_config(&config.access)),
    )
    .with_upload_config(&config.upload);
    Ok(pipeline)
}

// ── `dvault keygen` / `dvault status` ─────────────────────────────────────────

async fn cmd_keygen(config: &VaultConfig) -> Result<()> {
    let keys = KeyManager::from_config(&config.keys);
    let pair = keys
        .ensure_key_pair()
        .await
        .context("ensuring signing key pair")?;
    info!(
        private = %config.keys.private_key_path.display(),
        public = %config.keys.public_key_path.display(),
        "signing key pair ready"
    );
    print!("{}", pair.public_key_pem());
    Ok(())
}

async fn cmd_status(config: &VaultConfig) -> Result<()> {
    println!("dvault v{}", env!("CARGO_PKG_VERSION"));

    let blobs = blob_store(config)?;
    match dvault_storage::check_health(blobs.operator()).await {
        Ok(()) => println!("blob store:  ok ({:?})", config.storage.backend),
        Err(e) => println!("blob store:  UNREACHABLE ({e})"),
    }

    let private = &config.keys.private_key_path;
    let state = if private.exists() { "present" } else { "missing" };
    println!("signing key: {state} ({})", private.display());
    println!("key policy:  {:?}", config.keys.policy);
    println!("metadata:    {}", config.metadata.path.display());
    Ok(())
}

// ── `dvault upload` / `dvault download` ───────────────────────────────────────

async fn cmd_upload(
    config: &VaultConfig,
    file: &Path,
    user: i64,
    question: Option<i64>,
    mime: Option<String>,
) -> Result<()> {
    let mime_type = mime.unwrap_or_else(|| guess_mime(file).to_string());
    anyhow::ensure!(
        config.upload.is_allowed_mime(&mime_type),
        "MIME type {mime_type} is not in upload.allowed_mime_types"
    );

    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("no file name in {}", file.display()))?;
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;

    let pipeline = build_pipeline(config).await?;
    let descriptor = pipeline
        .upload(
            &bytes,
            user,
            UploadMetadata {
                filename,
                mime_type,
                question_id: question,
            },
        )
        .await
        .with_context(|| format!("uploading {}", file.display()))?;

    println!("{}", serde_json::to_string_pretty(&descriptor)?);
    Ok(())
}

async fn cmd_download(config: &VaultConfig, id: i64, user: i64, out: Option<PathBuf>) -> Result<()> {
    let pipeline = build_pipeline(config).await?;
    let doc = pipeline
        .download(id, user)
        .await
        .with_context(|| format!("downloading document {id}"))?;

    let dest = match out {
        Some(path) => path,
        None => {
            // Never let a stored filename escape the current directory
            Path::new(&doc.filename)
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(format!("document-{id}")))
        }
    };
    tokio::fs::write(&dest, &doc.bytes)
        .await
        .with_context(|| format!("writing {}", dest.display()))?;

    println!(
        "{} ({} bytes, {}) -> {}",
        doc.filename,
        doc.bytes.len(),
        doc.mime_type,
        dest.display()
    );
    Ok(())
}

// ── `dvault verify` / `dvault show` ───────────────────────────────────────────

async fn cmd_verify(config: &VaultConfig, id: i64) -> Result<()> {
    let pipeline = build_pipeline(config).await?;
    let report = pipeline
        .verify(id)
        .await
        .with_context(|| format!("verifying document {id}"))?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    anyhow::ensure!(report.is_valid(), "document {id} failed verification");
    Ok(())
}

async fn cmd_show(config: &VaultConfig, id: i64) -> Result<()> {
    let metadata = metadata_store(config).await?;
    let record = metadata
        .get(id)
        .await?
        .with_context(|| format!("document {id} not found"))?;

    let view = serde_json::json!({
        "id": record.id,
        "filename": record.filename,
        "mimeType": record.mime_type,
        "sizeBytes": record.size_bytes,
        "blobPath": record.blob_path,
        "contentHash": record.content_hash,
        "uploaderId": record.uploader_id,
        "questionId": record.question_id,
        "publicKey": record.public_key,
    });
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

// ── `dvault purge-question` ───────────────────────────────────────────────────

async fn cmd_purge_question(config: &VaultConfig, question_id: i64) -> Result<()> {
    let pipeline = build_pipeline(config).await?;
    let removed = pipeline
        .delete_for_question(question_id)
        .await
        .with_context(|| format!("purging documents of question {question_id}"))?;
    println!("removed {removed} document(s) for question {question_id}");
    Ok(())
}

// ── `dvault config show` ──────────────────────────────────────────────────────

fn cmd_config_show(config: &VaultConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "txt" | "md" => "text/plain",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_upload() {
        let cli = Cli::try_parse_from([
            "dvault", "upload", "notes.pdf", "--user", "7", "--question", "3",
        ])
        .unwrap();
        match cli.command {
            Commands::Upload {
                file,
                user,
                question,
                mime,
            } => {
                assert_eq!(file, PathBuf::from("notes.pdf"));
                assert_eq!(user, 7);
                assert_eq!(question, Some(3));
                assert_eq!(mime, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn download_requires_user() {
        assert!(Cli::try_parse_from(["dvault", "download", "4"]).is_err());
    }

    #[test]
    fn guesses_common_types() {
        assert_eq!(guess_mime(Path::new("a.PDF")), "application/pdf");
        assert_eq!(guess_mime(Path::new("scan.jpeg")), "image/jpeg");
        assert_eq!(guess_mime(Path::new("noext")), "application/octet-stream");
    }

    #[test]
    fn log_format_falls_back_to_text() {
        assert_eq!(log_format_from_config("JSON"), LogFormat::Json);
        assert_eq!(log_format_from_config("pretty"), LogFormat::Text);
    }
}
