//! At-rest encryption seam
//!
//! The core stores only ciphertext through [`EncryptionProvider`]; the
//! actual cipher is host-injected. [`PlaintextCipher`] is the identity
//! implementation for tests and local development.

use crate::error::Result;
use async_trait::async_trait;

/// Injectable encrypt/decrypt provider
#[async_trait]
pub trait EncryptionProvider: Send + Sync {
    /// Encrypt `plaintext` under `key`
    async fn encrypt(&self, plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt `ciphertext` under `key`
    async fn decrypt(&self, ciphertext: &[u8], key: &[u8]) -> Result<Vec<u8>>;

    /// Generate fresh key material suitable for this provider
    async fn generate_key(&self) -> Result<Vec<u8>>;
}

/// Identity cipher: passes bytes through unchanged
///
/// Exists so the storage path always exercises the encryption seam even
/// when no real cipher is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaintextCipher;

#[async_trait]
impl EncryptionProvider for PlaintextCipher {
    async fn encrypt(&self, plaintext: &[u8], _key: &[u8]) -> Result<Vec<u8>> {
        Ok(plaintext.to_vec())
    }

    async fn decrypt(&self, ciphertext: &[u8], _key: &[u8]) -> Result<Vec<u8>> {
        Ok(ciphertext.to_vec())
    }

    async fn generate_key(&self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}
