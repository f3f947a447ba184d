//! Deterministic envelope encryption for per-account secrets.
//!
//! Scheme (see the account & secret fabric component design):
//! `K = HKDF-SHA256(salt = master_key, ikm = subject, info = "secret:" + name, L = 32)`,
//! then `AES-256-GCM(key = K, nonce = N, plaintext, aad = info || 0x00 || subject)`.
//! The stored form is `v1:` followed by base64(`N || ciphertext_with_tag`).
//! Decryption also accepts the bare base64 form without the `v1:` prefix,
//! to tolerate secrets written before the prefix was introduced.

use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

const NONCE_LEN: usize = 12;
const VERSION_PREFIX: &str = "v1:";

/// A 32-byte process-wide secret. The only long-lived secret in the core.
///
/// Held in a `Zeroizing` buffer so it is wiped on drop; never implements
/// `Debug`/`Display` so it cannot leak into logs.
#[derive(Clone)]
pub struct MasterKey(Zeroizing<[u8; 32]>);

impl MasterKey {
    #[must_use]
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Parse from a base64 string (preferred) or, if that fails, treat
    /// the raw bytes of the input as the key (exactly 32 bytes required).
    ///
    /// # Errors
    /// Returns [`CryptoError::InvalidMasterKey`] if neither form yields
    /// exactly 32 bytes.
    pub fn parse(raw: &str) -> Result<Self, CryptoError> {
        if let Ok(decoded) = BASE64.decode(raw.trim())
            && let Ok(arr) = <[u8; 32]>::try_from(decoded.as_slice())
        {
            return Ok(Self::new(arr));
        }
        let bytes = raw.as_bytes();
        let arr = <[u8; 32]>::try_from(bytes).map_err(|_| CryptoError::InvalidMasterKey)?;
        Ok(Self::new(arr))
    }
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("MASTER_SECRET_KEY must decode to exactly 32 bytes")]
    InvalidMasterKey,
    #[error("ciphertext is not valid base64")]
    InvalidEncoding,
    #[error("ciphertext is too short to contain a nonce")]
    Truncated,
    #[error("decryption failed: ciphertext tampered or key/subject/info mismatch")]
    DecryptFailed,
}

fn derive_key(master_key: &MasterKey, subject: &[u8], info: &str) -> Zeroizing<[u8; 32]> {
    let hk = Hkdf::<Sha256>::new(Some(master_key.0.as_slice()), subject);
    let mut okm = Zeroizing::new([0u8; 32]);
    // `okm` is always exactly 32 bytes for SHA-256's max output length (8160 bytes).
    hk.expand(info.as_bytes(), okm.as_mut_slice())
        .expect("32-byte HKDF-SHA256 expansion never exceeds the max output length");
    okm
}

fn secret_info(name: &str) -> String {
    format!("secret:{name}")
}

fn aad_for(info: &str, subject: &[u8]) -> Vec<u8> {
    let mut aad = Vec::with_capacity(info.len() + 1 + subject.len());
    aad.extend_from_slice(info.as_bytes());
    aad.push(0u8);
    aad.extend_from_slice(subject);
    aad
}

/// Encrypt `plaintext` for `(subject, name)` under `master_key`.
///
/// # Errors
/// Never fails for well-formed inputs; kept fallible for symmetry with
/// [`decrypt`] and because AES-GCM encryption is technically fallible.
pub fn encrypt(
    master_key: &MasterKey,
    subject: &[u8],
    name: &str,
    plaintext: &[u8],
) -> Result<String, CryptoError> {
    let info = secret_info(name);
    let key = derive_key(master_key, subject, &info);
    let cipher = Aes256Gcm::new_from_slice(key.as_slice()).map_err(|_| CryptoError::DecryptFailed)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let aad = aad_for(&info, subject);
    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad: &aad,
            },
        )
        .map_err(|_| CryptoError::DecryptFailed)?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);

    Ok(format!("{VERSION_PREFIX}{}", BASE64.encode(sealed)))
}

/// Decrypt a stored envelope for `(subject, name)` under `master_key`.
///
/// Accepts the form with or without the `v1:` prefix.
///
/// # Errors
/// Returns [`CryptoError::DecryptFailed`] if the ciphertext was tampered
/// with, or if `subject`/`name` does not match what it was sealed under.
pub fn decrypt(
    master_key: &MasterKey,
    subject: &[u8],
    name: &str,
    stored: &str,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let b64 = stored.strip_prefix(VERSION_PREFIX).unwrap_or(stored);
    let sealed = BASE64.decode(b64).map_err(|_| CryptoError::InvalidEncoding)?;
    if sealed.len() < NONCE_LEN {
        return Err(CryptoError::Truncated);
    }
    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);

    let info = secret_info(name);
    let key = derive_key(master_key, subject, &info);
    let cipher = Aes256Gcm::new_from_slice(key.as_slice()).map_err(|_| CryptoError::DecryptFailed)?;
    let nonce = Nonce::from_slice(nonce_bytes);
    let aad = aad_for(&info, subject);

    let plaintext = cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad: &aad,
            },
        )
        .map_err(|_| CryptoError::DecryptFailed)?;

    Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> MasterKey {
        MasterKey::new([7u8; 32])
    }

    #[test]
    fn round_trip() {
        let k = key();
        let sealed = encrypt(&k, b"acct-1", "api_key", b"super-secret").unwrap();
        assert!(sealed.starts_with("v1:"));
        let opened = decrypt(&k, b"acct-1", "api_key", &sealed).unwrap();
        assert_eq!(opened.as_slice(), b"super-secret");
    }

    #[test]
    fn decrypt_accepts_missing_prefix_for_migration() {
        let k = key();
        let sealed = encrypt(&k, b"acct-1", "api_key", b"value").unwrap();
        let bare = sealed.strip_prefix("v1:").unwrap();
        let opened = decrypt(&k, b"acct-1", "api_key", bare).unwrap();
        assert_eq!(opened.as_slice(), b"value");
    }

    #[test]
    fn wrong_subject_fails() {
        let k = key();
        let sealed = encrypt(&k, b"acct-1", "api_key", b"value").unwrap();
        assert!(decrypt(&k, b"acct-2", "api_key", &sealed).is_err());
    }

    #[test]
    fn wrong_info_fails() {
        let k = key();
        let sealed = encrypt(&k, b"acct-1", "api_key", b"value").unwrap();
        assert!(decrypt(&k, b"acct-1", "other_name", &sealed).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let k = key();
        let sealed = encrypt(&k, b"acct-1", "api_key", b"value").unwrap();
        let mut raw = sealed.into_bytes();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        let tampered = String::from_utf8(raw).unwrap();
        assert!(decrypt(&k, b"acct-1", "api_key", &tampered).is_err());
    }

    #[test]
    fn ciphertext_is_nondeterministic_but_key_is_deterministic() {
        let k = key();
        let a = encrypt(&k, b"acct-1", "api_key", b"value").unwrap();
        let b = encrypt(&k, b"acct-1", "api_key", b"value").unwrap();
        assert_ne!(a, b, "nonce must differ between calls");
        assert_eq!(
            decrypt(&k, b"acct-1", "api_key", &a).unwrap().as_slice(),
            decrypt(&k, b"acct-1", "api_key", &b).unwrap().as_slice(),
        );
    }

    #[test]
    fn master_key_parses_base64() {
        let raw = BASE64.encode([1u8; 32]);
        let parsed = MasterKey::parse(&raw).unwrap();
        assert_eq!(parsed.0.as_slice(), [1u8; 32]);
    }

    #[test]
    fn master_key_rejects_wrong_length() {
        assert!(MasterKey::parse("too-short").is_err());
    }
}
