use base64::{Engine as _, engine::general_purpose::STANDARD};
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit},
};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

const NONCE_LEN: usize = 12;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("no cipher key configured")]
    MissingKey,
    #[error("encryption error: {0}")]
    Encryption(String),
    #[error("decryption error: {0}")]
    Decryption(String),
}

/// Process-wide symmetric cipher for secrets that are handed to child
/// processes through their environment.
///
/// Encryption is deterministic: the nonce is derived from the plaintext, so
/// the same secret always produces the same ciphertext under one key. The
/// encoded form is `base64(nonce || ciphertext)`.
#[derive(Clone)]
pub struct TokenCipher {
    key: Option<[u8; 32]>,
}

impl fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCipher")
            .field("configured", &self.key.is_some())
            .finish()
    }
}

impl TokenCipher {
    pub fn new(secret: &str) -> Self {
        if secret.is_empty() {
            return Self::disabled();
        }
        let digest = Sha256::digest(secret.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self { key: Some(key) }
    }

    /// A cipher without key material; every `encrypt` fails with
    /// [`CryptoError::MissingKey`].
    pub fn disabled() -> Self {
        Self { key: None }
    }

    pub fn is_configured(&self) -> bool {
        self.key.is_some()
    }

    fn key(&self) -> Result<&[u8; 32], CryptoError> {
        self.key.as_ref().ok_or(CryptoError::MissingKey)
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let key = self.key()?;
        let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
            .map_err(|err| CryptoError::Encryption(err.to_string()))?;
        mac.update(plaintext.as_bytes());
        let tag = mac.finalize().into_bytes();
        let nonce_bytes = &tag[..NONCE_LEN];

        let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(nonce_bytes), plaintext.as_bytes())
            .map_err(|err| CryptoError::Encryption(err.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, CryptoError> {
        let key = self.key()?;
        let sealed = STANDARD
            .decode(encoded.trim())
            .map_err(|err| CryptoError::Decryption(err.to_string()))?;
        if sealed.len() <= NONCE_LEN {
            return Err(CryptoError::Decryption("ciphertext too short".into()));
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);

        let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|err| CryptoError::Decryption(err.to_string()))?;

        String::from_utf8(plaintext).map_err(|err| CryptoError::Decryption(err.to_string()))
    }
}
