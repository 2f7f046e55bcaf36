//! Optional at-rest encryption for the credential file.

use {
    base64::{Engine, engine::general_purpose::STANDARD},
    chacha20poly1305::{
        ChaCha20Poly1305, Key, Nonce,
        aead::{Aead, KeyInit},
    },
    rand::RngCore,
};

use crate::error::{Error, StorageError};

const MAGIC: &str = "plusgate-v1:";
const NONCE_LEN: usize = 12;

/// ChaCha20-Poly1305 sealing of a whole credential file.
///
/// Output is `plusgate-v1:` followed by base64 of `nonce || ciphertext`.
#[derive(Clone)]
pub struct TokenCipher {
    key: [u8; 32],
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl TokenCipher {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Parse a base64-encoded 32-byte key, as written in the config file.
    pub fn from_base64(encoded: &str) -> Result<Self, Error> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::config(format!("encryption key is not valid base64: {e}")))?;
        let key: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            Error::config(format!("encryption key must be 32 bytes, got {}", b.len()))
        })?;
        Ok(Self::new(key))
    }

    fn aead(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.key))
    }

    pub fn seal(&self, plain: &[u8]) -> Result<Vec<u8>, StorageError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .aead()
            .encrypt(Nonce::from_slice(&nonce), plain)
            .map_err(|_| StorageError::Crypto)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(format!("{MAGIC}{}", STANDARD.encode(blob)).into_bytes())
    }

    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, StorageError> {
        let text = std::str::from_utf8(sealed)
            .map_err(|_| StorageError::Malformed("encrypted file is not text".into()))?;
        let encoded = text.trim().strip_prefix(MAGIC).ok_or_else(|| {
            StorageError::Malformed("credential file is not encrypted with a plusgate key".into())
        })?;
        let blob = STANDARD
            .decode(encoded)
            .map_err(|e| StorageError::Malformed(format!("encrypted file: {e}")))?;
        if blob.len() < NONCE_LEN {
            return Err(StorageError::Malformed("encrypted file truncated".into()));
        }

        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        self.aead()
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| StorageError::Crypto)
    }
}
