pub mod config;
pub mod error;
pub mod types;

pub use error::{VaultError, VaultResult};
pub use types::{
    DocumentDescriptor, DocumentRecord, DownloadedDocument, NewDocument, UploadMetadata,
    UserStatus,
};
