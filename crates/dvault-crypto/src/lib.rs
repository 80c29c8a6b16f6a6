//! dvault-crypto: cryptographic building blocks of the document vault
//!
//! Upload path: plaintext → AES-256-GCM (fresh key + nonce) → SHA-256(plaintext)
//! → HMAC-SHA256(ciphertext, fresh key) → Ed25519 signature over plaintext
//!
//! ```text
//! Signing key pair (Ed25519, one per deployment, PEM on disk)
//!   └── signs plaintext of every document
//! Per-document material (random, never reused)
//!   ├── DocumentKey (256-bit) + nonce (96-bit) → AES-256-GCM, detached 128-bit tag
//!   └── HmacKey (256-bit) → HMAC-SHA256 over the ciphertext
//! ```

pub mod cipher;
pub mod integrity;
pub mod keys;
pub mod signer;

pub use cipher::{decrypt, encrypt, SealedDocument};
pub use integrity::{compute_hmac, content_hash, verify_hmac};
pub use keys::{DocumentKey, HmacKey, KeyManager, SigningKeyPair};
pub use signer::{sign, verify};

/// Size of an AES-256 document key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of an HMAC-SHA256 key
pub const HMAC_KEY_SIZE: usize = 32;

/// Size of an Ed25519 signature
pub const SIGNATURE_SIZE: usize = 64;
