//! Two independent integrity layers
//!
//! - `content_hash`: SHA-256 of the plaintext, certifies what the document was
//! - `compute_hmac`: HMAC-SHA256 of the ciphertext, certifies the blob was not
//!   altered in storage; checked before any decryption is attempted

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use dvault_core::{VaultError, VaultResult};

type HmacSha256 = Hmac<Sha256>;

/// SHA-256 of `data`, lowercase hex (64 chars).
pub fn content_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// HMAC-SHA256 of `data` under `key`, lowercase hex (64 chars).
pub fn compute_hmac(data: &[u8], key: &[u8]) -> VaultResult<String> {
    Ok(hex::encode(mac_bytes(data, key)?))
}

/// Constant-time check of `expected_hex` against the HMAC of `data`.
///
/// Malformed hex or a wrong-length tag is simply a failed verification.
pub fn verify_hmac(data: &[u8], key: &[u8], expected_hex: &str) -> bool {
    let Ok(expected) = hex::decode(expected_hex.trim()) else {
        return false;
    };
    let Ok(actual) = mac_bytes(data, key) else {
        return false;
    };
    actual.as_slice().ct_eq(expected.as_slice()).into()
}

fn mac_bytes(data: &[u8], key: &[u8]) -> VaultResult<Vec<u8>> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| VaultError::IntegrityFailure(format!("HMAC key rejected: {e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}
