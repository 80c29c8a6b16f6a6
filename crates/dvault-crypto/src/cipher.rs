//! Whole-document AES-256-GCM encryption/decryption
//!
//! Every call to [`encrypt`] draws a fresh random key and nonce, so a
//! (key, nonce) pair can never be used for two documents. The tag is kept
//! detached from the ciphertext because the metadata record stores it in its
//! own field; the blob holds exactly `plaintext.len()` bytes.

use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    Aes256Gcm, Nonce, Tag,
};
use rand::RngCore;

use dvault_core::{VaultError, VaultResult};

use crate::keys::DocumentKey;
use crate::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};

/// Output of [`encrypt`]: ciphertext plus everything needed to reverse it.
pub struct SealedDocument {
    pub ciphertext: Vec<u8>,
    pub key: DocumentKey,
    pub nonce: [u8; NONCE_SIZE],
    pub tag: [u8; TAG_SIZE],
}

impl std::fmt::Debug for SealedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedDocument")
            .field("ciphertext_len", &self.ciphertext.len())
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Largest plaintext AES-GCM can seal under one nonce (2^36 - 32 bytes).
pub const MAX_PLAINTEXT_LEN: u64 = (1 << 36) - 32;

/// Encrypt a document under a freshly generated key and nonce.
///
/// Oversized input is the caller's error (`Validation`). With the length in
/// range the cipher cannot fail; if it does anyway that is reported as an
/// `IntegrityFailure`, not blamed on the input.
pub fn encrypt(plaintext: &[u8]) -> VaultResult<SealedDocument> {
    check_plaintext_len(plaintext.len() as u64)?;
    let key = DocumentKey::generate();

    let mut nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&nonce), b"", &mut buffer)
        .map_err(|e| VaultError::IntegrityFailure(format!("sealing document failed: {e}")))?;

    let mut tag_bytes = [0u8; TAG_SIZE];
    tag_bytes.copy_from_slice(tag.as_slice());

    Ok(SealedDocument {
        ciphertext: buffer,
        key,
        nonce,
        tag: tag_bytes,
    })
}

fn check_plaintext_len(len: u64) -> VaultResult<()> {
    if len > MAX_PLAINTEXT_LEN {
        return Err(VaultError::Validation(format!(
            "document is {len} bytes, AES-GCM limit is {MAX_PLAINTEXT_LEN}"
        )));
    }
    Ok(())
}

/// Decrypt and authenticate a document.
///
/// Fails with `IntegrityFailure` when the tag does not verify (tampered
/// ciphertext, wrong key, nonce, or tag).
pub fn decrypt(
    ciphertext: &[u8],
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    tag: &[u8; TAG_SIZE],
) -> VaultResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.into());
    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(nonce),
            b"",
            &mut buffer,
            Tag::from_slice(tag),
        )
        .map_err(|_| {
            VaultError::IntegrityFailure(
                "authenticated decryption failed: invalid key, nonce, tag, or corrupted ciphertext"
                    .into(),
            )
        })?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let plaintext = b"hello, encrypted forum!";
        let sealed = encrypt(plaintext).unwrap();
        let decrypted =
            decrypt(&sealed.ciphertext, sealed.key.as_bytes(), &sealed.nonce, &sealed.tag).unwrap();
        assert_eq!(&decrypted, plaintext);
    }

    #[test]
    fn test_ciphertext_same_length_as_plaintext() {
        let plaintext = vec![7u8; 1000];
        let sealed = encrypt(&plaintext).unwrap();
        assert_eq!(sealed.ciphertext.len(), plaintext.len());
        assert_ne!(sealed.ciphertext, plaintext);
    }

    #[test]
    fn test_fresh_key_and_nonce_per_call() {
        let a = encrypt(b"same plaintext").unwrap();
        let b = encrypt(b"same plaintext").unwrap();
        assert_ne!(a.key.as_bytes(), b.key.as_bytes());
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_plaintext_length_limit() {
        assert!(check_plaintext_len(0).is_ok());
        assert!(check_plaintext_len(MAX_PLAINTEXT_LEN).is_ok());
        let err = check_plaintext_len(MAX_PLAINTEXT_LEN + 1).unwrap_err();
        assert!(matches!(err, VaultError::Validation(_)));
    }

    #[test]
    fn test_empty_plaintext_seals() {
        let sealed = encrypt(b"").unwrap();
        assert!(sealed.ciphertext.is_empty());
        let opened = decrypt(&[], sealed.key.as_bytes(), &sealed.nonce, &sealed.tag).unwrap();
        assert!(opened.is_empty());
    }

    #[test]
    fn test_decrypt_wrong_key() {
        let sealed = encrypt(b"secret data").unwrap();
        let other = DocumentKey::generate();
        let result = decrypt(&sealed.ciphertext, other.as_bytes(), &sealed.nonce, &sealed.tag);
        assert!(matches!(result, Err(VaultError::IntegrityFailure(_))));
    }

    #[test]
    fn test_decrypt_wrong_nonce() {
        let sealed = encrypt(b"secret data").unwrap();
        let mut nonce = sealed.nonce;
        nonce[0] ^= 0x01;
        let result = decrypt(&sealed.ciphertext, sealed.key.as_bytes(), &nonce, &sealed.tag);
        assert!(matches!(result, Err(VaultError::IntegrityFailure(_))));
    }

    #[test]
    fn test_tampered_tag() {
        let sealed = encrypt(b"secret data").unwrap();
        let mut tag = sealed.tag;
        tag[15] ^= 0x80;
        let result = decrypt(&sealed.ciphertext, sealed.key.as_bytes(), &sealed.nonce, &tag);
        assert!(matches!(result, Err(VaultError::IntegrityFailure(_))));
    }

    proptest! {
        #[test]
        fn any_bit_flip_is_detected(
            data in proptest::collection::vec(any::<u8>(), 1..=512),
            pos in any::<usize>(),
            bit in 0u8..8,
        ) {
            let sealed = encrypt(&data).unwrap();
            let mut tampered = sealed.ciphertext.clone();
            let idx = pos % tampered.len();
            tampered[idx] ^= 1 << bit;
            let result = decrypt(&tampered, sealed.key.as_bytes(), &sealed.nonce, &sealed.tag);
            prop_assert!(result.is_err());
        }
    }
}
