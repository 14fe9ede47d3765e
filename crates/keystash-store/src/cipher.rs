//! Password-based key derivation and authenticated encryption of record secrets.
//!
//! Keys are derived with PBKDF2-HMAC from the password and the record's
//! metadata, used for a single seal/open, and zeroized on drop.

use aes_gcm::Aes256Gcm;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use keystash_core::{CipherSuite, HashAlgorithm, KeyMetadata, Result, StoreError};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha512};
use zeroize::Zeroizing;

/// Length of the symmetric key handed to either cipher.
pub const KEY_LEN: usize = 32;
/// Work factor used for freshly generated metadata.
pub const DEFAULT_ITERATIONS: u32 = 10_000;
/// Upper bound accepted from stored metadata.
pub const MAX_ITERATIONS: u32 = 10_000_000;

/// Settings for metadata generated on secret writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    pub cipher: CipherSuite,
    pub hash: HashAlgorithm,
    pub iterations: u32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            cipher: CipherSuite::default(),
            hash: HashAlgorithm::default(),
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

/// New metadata with a random nonce drawn from the OS CSPRNG.
pub fn fresh_metadata(options: &StoreOptions) -> KeyMetadata {
    let mut nonce = vec![0u8; options.cipher.nonce_len()];
    OsRng.fill_bytes(&mut nonce);
    KeyMetadata {
        cipher: options.cipher,
        hash: options.hash,
        iterations: options.iterations,
        nonce: STANDARD.encode(nonce),
    }
}

/// Check metadata bounds and return the decoded nonce.
pub fn validate_metadata(metadata: &KeyMetadata) -> Result<Vec<u8>> {
    if metadata.iterations == 0 {
        return Err(StoreError::invalid_metadata("iterations must be positive"));
    }
    if metadata.iterations > MAX_ITERATIONS {
        return Err(StoreError::invalid_metadata(format!(
            "iterations {} exceed the maximum of {MAX_ITERATIONS}",
            metadata.iterations
        )));
    }

    let nonce = STANDARD
        .decode(&metadata.nonce)
        .map_err(|e| StoreError::invalid_metadata(format!("nonce decode failed: {e}")))?;
    let expected = metadata.cipher.nonce_len();
    if nonce.len() != expected {
        return Err(StoreError::invalid_metadata(format!(
            "{} expects a {expected}-byte nonce, got {}",
            metadata.cipher,
            nonce.len()
        )));
    }
    Ok(nonce)
}

/// Derive the key material for `metadata`. Deterministic for a given input.
pub fn derive_key(password: &str, metadata: &KeyMetadata) -> Result<Zeroizing<Vec<u8>>> {
    let salt = validate_metadata(metadata)?;
    Ok(derive_with_salt(password, metadata, &salt))
}

fn derive_with_salt(password: &str, metadata: &KeyMetadata, salt: &[u8]) -> Zeroizing<Vec<u8>> {
    let mut out = Zeroizing::new(vec![0u8; metadata.cipher.derived_len()]);
    match metadata.hash {
        HashAlgorithm::Sha256 => {
            pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, metadata.iterations, &mut out)
        }
        HashAlgorithm::Sha512 => {
            pbkdf2::pbkdf2_hmac::<Sha512>(password.as_bytes(), salt, metadata.iterations, &mut out)
        }
    }
    out
}

/// Seal `plaintext` and return it base64-encoded (tag included).
pub fn encrypt(plaintext: &[u8], metadata: &KeyMetadata, password: &str) -> Result<String> {
    let nonce = validate_metadata(metadata)?;
    let derived = derive_with_salt(password, metadata, &nonce);

    let sealed = match metadata.cipher {
        CipherSuite::XChaCha20Poly1305 => xchacha(&derived)?
            .encrypt(XNonce::from_slice(&nonce), plaintext)
            .map_err(|e| crypto_err(format!("encrypt failed: {e}")))?,
        CipherSuite::Aes256Gcm => {
            let (key, iv) = derived.split_at(KEY_LEN);
            aes(key)?
                .encrypt(aes_gcm::Nonce::from_slice(iv), plaintext)
                .map_err(|e| crypto_err(format!("encrypt failed: {e}")))?
        }
    };
    Ok(STANDARD.encode(sealed))
}

/// Open a base64 ciphertext. Any authentication failure is `Decryption`.
pub fn decrypt(
    ciphertext: &str,
    metadata: &KeyMetadata,
    password: &str,
) -> Result<Zeroizing<Vec<u8>>> {
    let nonce = validate_metadata(metadata)?;
    let sealed = STANDARD
        .decode(ciphertext)
        .map_err(|_| StoreError::Decryption)?;
    let derived = derive_with_salt(password, metadata, &nonce);

    let opened = match metadata.cipher {
        CipherSuite::XChaCha20Poly1305 => xchacha(&derived)?
            .decrypt(XNonce::from_slice(&nonce), sealed.as_slice())
            .map_err(|_| StoreError::Decryption)?,
        CipherSuite::Aes256Gcm => {
            let (key, iv) = derived.split_at(KEY_LEN);
            aes(key)?
                .decrypt(aes_gcm::Nonce::from_slice(iv), sealed.as_slice())
                .map_err(|_| StoreError::Decryption)?
        }
    };
    Ok(Zeroizing::new(opened))
}

fn xchacha(key: &[u8]) -> Result<XChaCha20Poly1305> {
    XChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| crypto_err(format!("cipher init failed: {e}")))
}

fn aes(key: &[u8]) -> Result<Aes256Gcm> {
    Aes256Gcm::new_from_slice(key).map_err(|e| crypto_err(format!("cipher init failed: {e}")))
}

fn crypto_err(reason: String) -> StoreError {
    StoreError::Crypto { reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(cipher: CipherSuite) -> StoreOptions {
        StoreOptions {
            cipher,
            hash: HashAlgorithm::Sha256,
            iterations: 32,
        }
    }

    #[test]
    fn seals_and_opens_with_both_suites() {
        for suite in [CipherSuite::XChaCha20Poly1305, CipherSuite::Aes256Gcm] {
            let metadata = fresh_metadata(&options(suite));
            let sealed = encrypt(b"{\"privateKey\":\"k\"}", &metadata, "pw").expect("encrypt");
            assert!(!sealed.contains("privateKey"));

            let opened = decrypt(&sealed, &metadata, "pw").expect("decrypt");
            assert_eq!(opened.as_slice(), b"{\"privateKey\":\"k\"}");
        }
    }

    #[test]
    fn wrong_password_fails_authentication() {
        for suite in [CipherSuite::XChaCha20Poly1305, CipherSuite::Aes256Gcm] {
            let metadata = fresh_metadata(&options(suite));
            let sealed = encrypt(b"secret", &metadata, "right").expect("encrypt");
            let err = decrypt(&sealed, &metadata, "wrong").expect_err("should fail");
            assert!(matches!(err, StoreError::Decryption));
        }
    }

    #[test]
    fn tampered_ciphertext_is_detected() {
        let metadata = fresh_metadata(&options(CipherSuite::XChaCha20Poly1305));
        let sealed = encrypt(b"secret", &metadata, "pw").expect("encrypt");
        let mut bytes = STANDARD.decode(&sealed).expect("b64");
        bytes[0] ^= 0x01;
        let err = decrypt(&STANDARD.encode(bytes), &metadata, "pw").expect_err("tampered");
        assert!(matches!(err, StoreError::Decryption));

        let err = decrypt("***", &metadata, "pw").expect_err("not base64");
        assert!(matches!(err, StoreError::Decryption));
    }

    #[test]
    fn derivation_is_deterministic_and_sized_per_suite() {
        let metadata = fresh_metadata(&options(CipherSuite::Aes256Gcm));
        let first = derive_key("pw", &metadata).expect("derive");
        let second = derive_key("pw", &metadata).expect("derive");
        assert_eq!(first.as_slice(), second.as_slice());
        assert_eq!(first.len(), 44);

        let other = derive_key("pw2", &metadata).expect("derive");
        assert_ne!(first.as_slice(), other.as_slice());

        let mut sha512 = metadata.clone();
        sha512.hash = HashAlgorithm::Sha512;
        let wide = derive_key("pw", &sha512).expect("derive");
        assert_ne!(first.as_slice(), wide.as_slice());
    }

    #[test]
    fn fresh_metadata_never_repeats_nonce() {
        let opts = StoreOptions::default();
        let a = fresh_metadata(&opts);
        let b = fresh_metadata(&opts);
        assert_ne!(a.nonce, b.nonce);
        assert_eq!(a.iterations, DEFAULT_ITERATIONS);
        assert_eq!(STANDARD.decode(&a.nonce).unwrap().len(), 24);
    }

    #[test]
    fn rejects_out_of_bounds_metadata() {
        let mut metadata = fresh_metadata(&options(CipherSuite::XChaCha20Poly1305));
        metadata.iterations = 0;
        assert!(matches!(
            validate_metadata(&metadata),
            Err(StoreError::InvalidMetadata { .. })
        ));

        metadata.iterations = MAX_ITERATIONS + 1;
        assert!(matches!(
            encrypt(b"x", &metadata, "pw"),
            Err(StoreError::InvalidMetadata { .. })
        ));

        metadata.iterations = 32;
        metadata.nonce = STANDARD.encode([0u8; 12]);
        assert!(matches!(
            decrypt("AAAA", &metadata, "pw"),
            Err(StoreError::InvalidMetadata { .. })
        ));

        metadata.nonce = "%%%".into();
        assert!(matches!(
            derive_key("pw", &metadata),
            Err(StoreError::InvalidMetadata { .. })
        ));
    }
}
