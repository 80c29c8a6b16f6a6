//! dvault-storage: ciphertext blob store (OpenDAL) + document metadata store

pub mod blob;
pub mod health;
pub mod metadata;
pub mod operator;

pub use blob::BlobStore;
pub use health::check_health;
pub use metadata::{JsonMetadataStore, MemoryMetadataStore, MetadataStore};
pub use operator::{build_operator, S3Credentials};
