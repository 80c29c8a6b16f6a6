//! Detached Ed25519 signatures over document plaintext
//!
//! Signatures are always 64 raw bytes; the public key travels as SPKI PEM.
//! Verification uses `verify_strict`, which rejects malleable encodings.

use ed25519_dalek::pkcs8::DecodePublicKey;
use ed25519_dalek::{Signature, Signer as _, SigningKey, VerifyingKey};

/// Sign `plaintext` with the deployment signing key.
pub fn sign(plaintext: &[u8], key: &SigningKey) -> Vec<u8> {
    key.sign(plaintext).to_bytes().to_vec()
}

/// Verify a detached signature against a PEM public key.
///
/// Any malformed input (bad PEM, wrong signature length) is a failed check.
pub fn verify(plaintext: &[u8], signature: &[u8], public_key_pem: &str) -> bool {
    let Ok(public_key) = VerifyingKey::from_public_key_pem(public_key_pem) else {
        tracing::debug!("signature check: public key PEM does not parse");
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    public_key.verify_strict(plaintext, &signature).is_ok()
}
