//! AES-256-GCM message encryption
//!
//! ## Wire format
//!
//! Each ciphertext string is URL-safe base64 (padded) of:
//! - Nonce (12 bytes), fresh per message
//! - Ciphertext (variable)
//! - Tag (16 bytes)
//!
//! Decryption returns each plaintext as URL-safe base64 as well, so arbitrary
//! bytes survive the string-typed RPC field.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::engine::{general_purpose::URL_SAFE, Engine};
use rand::{rngs::OsRng, RngCore};

use crate::error::{EncryptionError, Result};

pub const KEY_LENGTH: usize = 32;
pub const NONCE_LENGTH: usize = 12;
const TAG_LENGTH: usize = 16;

/// Upper bound for `GenerateRandomString`
pub const MAX_RANDOM_LENGTH: usize = 4096;

/// Length of identifiers produced by [`generate_id`]
pub const ID_LENGTH: usize = 20;

/// Lowercase base32hex; 32 symbols so a masked byte maps without bias
const ID_ALPHABET: &[u8; 32] = b"0123456789abcdefghijklmnopqrstuv";

fn cipher_for(key: &[u8]) -> Result<Aes256Gcm> {
    if key.len() != KEY_LENGTH {
        return Err(EncryptionError::InvalidKeyLength(key.len()));
    }
    Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::InvalidKeyLength(key.len()))
}

/// Seal every plaintext under `key` with its own nonce
pub fn encrypt_batch<S: AsRef<str>>(plaintexts: &[S], key: &[u8]) -> Result<Vec<String>> {
    let cipher = cipher_for(key)?;

    plaintexts
        .iter()
        .map(|plaintext| {
            let mut nonce_bytes = [0u8; NONCE_LENGTH];
            OsRng.fill_bytes(&mut nonce_bytes);
            let nonce = Nonce::from_slice(&nonce_bytes);

            let sealed = cipher
                .encrypt(nonce, plaintext.as_ref().as_bytes())
                .map_err(|_| EncryptionError::EncryptionFailed)?;

            let mut out = Vec::with_capacity(NONCE_LENGTH + sealed.len());
            out.extend_from_slice(&nonce_bytes);
            out.extend_from_slice(&sealed);
            Ok(URL_SAFE.encode(out))
        })
        .collect()
}

/// Open every ciphertext; one failure fails the whole batch
pub fn decrypt_batch<S: AsRef<str>>(ciphertexts: &[S], key: &[u8]) -> Result<Vec<String>> {
    let cipher = cipher_for(key)?;

    ciphertexts
        .iter()
        .map(|encoded| {
            let raw = URL_SAFE
                .decode(encoded.as_ref())
                .map_err(|_| EncryptionError::InvalidBase64)?;
            if raw.len() < NONCE_LENGTH + TAG_LENGTH {
                return Err(EncryptionError::CiphertextTooShort(raw.len()));
            }

            let (nonce_bytes, sealed) = raw.split_at(NONCE_LENGTH);
            let plaintext = cipher
                .decrypt(Nonce::from_slice(nonce_bytes), sealed)
                .map_err(|_| EncryptionError::DecryptionFailed)?;
            Ok(URL_SAFE.encode(plaintext))
        })
        .collect()
}

/// `length` bytes from the OS RNG
pub fn random_bytes(length: i32) -> Result<Vec<u8>> {
    let len = usize::try_from(length)
        .ok()
        .filter(|len| (1..=MAX_RANDOM_LENGTH).contains(len))
        .ok_or(EncryptionError::InvalidRandomLength(length))?;

    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    Ok(bytes)
}

pub fn encode_key(bytes: &[u8]) -> String {
    URL_SAFE.encode(bytes)
}

/// 20 characters, 100 bits of entropy, URL safe
pub fn generate_id() -> String {
    let mut bytes = [0u8; ID_LENGTH];
    OsRng.fill_bytes(&mut bytes);
    bytes
        .iter()
        .map(|b| ID_ALPHABET[usize::from(b & 0x1f)] as char)
        .collect()
}
