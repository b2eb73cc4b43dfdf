//! AES-256-GCM encryption of small payloads, with a text encoding that is safe
//! inside URL query components and config values.
//!
//! Encoded form: percent-escaped standard base64 of `nonce || ciphertext || tag`.
//! Keys are 32 random bytes and only ever leave this module in encoded form.

use std::fmt;

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use keystash_core::storage::SecretStoreError;
use rand::RngCore;
use thiserror::Error;

/// Raw key length in bytes.
pub const KEY_LEN: usize = 32;
/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CryptError {
    #[error("escape decode error: {0}")]
    Escape(String),
    #[error("base64 decode error: {0}")]
    Base64(String),
    #[error("expected a 32-byte key, got {0} bytes")]
    KeyLength(usize),
    #[error("ciphertext too short: {0} bytes")]
    Truncated(usize),
    #[error("cipher error: {0}")]
    Cipher(String),
    #[error("plaintext is not valid utf-8")]
    Utf8,
}

impl From<CryptError> for SecretStoreError {
    fn from(err: CryptError) -> Self {
        SecretStoreError::io("crypt", err)
    }
}

/// Generate a fresh encoded key.
pub fn generate_key() -> String {
    let mut bytes = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut bytes);
    encode(&bytes)
}

/// Encrypt `plaintext` under an encoded key.
pub fn encrypt(key: &str, plaintext: &[u8]) -> Result<String, CryptError> {
    seal(&build_cipher(key)?, plaintext)
}

/// Decrypt text produced by [`encrypt`] with the same key.
pub fn decrypt(key: &str, text: &str) -> Result<Vec<u8>, CryptError> {
    open(&build_cipher(key)?, text)
}

/// Base64 (standard alphabet) then percent-escape.
pub fn encode(bytes: &[u8]) -> String {
    urlencoding::encode(&STANDARD.encode(bytes)).into_owned()
}

/// Reverse of [`encode`]. Unescaping follows query-component rules, so a bare
/// `+` is a space and only `%2B` yields a base64 `+`. Malformed escapes survive
/// the first stage and are rejected by the base64 stage.
pub fn decode(text: &str) -> Result<Vec<u8>, CryptError> {
    let plus_replaced = text.replace('+', " ");
    let unescaped = urlencoding::decode(&plus_replaced)
        .map_err(|e| CryptError::Escape(e.to_string()))?;
    STANDARD
        .decode(unescaped.as_bytes())
        .map_err(|e| CryptError::Base64(e.to_string()))
}

/// Holds one encoded key and the cipher built from it.
#[derive(Clone)]
pub struct Cryptor {
    key: String,
    cipher: Aes256Gcm,
}

impl Cryptor {
    /// Use the supplied key, or generate one when `None`. Retrieve it with [`Cryptor::key`].
    pub fn new(key: Option<String>) -> Result<Self, CryptError> {
        let key = key.unwrap_or_else(generate_key);
        let cipher = build_cipher(&key)?;
        Ok(Self { key, cipher })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, CryptError> {
        seal(&self.cipher, plaintext)
    }

    pub fn decrypt(&self, text: &str) -> Result<Vec<u8>, CryptError> {
        open(&self.cipher, text)
    }

    pub fn encrypt_str(&self, plaintext: &str) -> Result<String, CryptError> {
        self.encrypt(plaintext.as_bytes())
    }

    pub fn decrypt_str(&self, text: &str) -> Result<String, CryptError> {
        String::from_utf8(self.decrypt(text)?).map_err(|_| CryptError::Utf8)
    }
}

impl fmt::Debug for Cryptor {
    // never print key material
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cryptor").finish_non_exhaustive()
    }
}

fn build_cipher(key: &str) -> Result<Aes256Gcm, CryptError> {
    let bytes = decode(key)?;
    if bytes.len() != KEY_LEN {
        return Err(CryptError::KeyLength(bytes.len()));
    }
    Aes256Gcm::new_from_slice(&bytes).map_err(|e| CryptError::Cipher(e.to_string()))
}

fn seal(cipher: &Aes256Gcm, plaintext: &[u8]) -> Result<String, CryptError> {
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let sealed = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptError::Cipher(e.to_string()))?;

    let mut envelope = Vec::with_capacity(NONCE_LEN + sealed.len());
    envelope.extend_from_slice(nonce.as_slice());
    envelope.extend_from_slice(&sealed);
    Ok(encode(&envelope))
}

fn open(cipher: &Aes256Gcm, text: &str) -> Result<Vec<u8>, CryptError> {
    let envelope = decode(text)?;
    if envelope.len() < NONCE_LEN {
        return Err(CryptError::Truncated(envelope.len()));
    }
    let (nonce, sealed) = envelope.split_at(NONCE_LEN);
    cipher
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|e| CryptError::Cipher(e.to_string()))
}
