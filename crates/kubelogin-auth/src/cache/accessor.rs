//! Storage for the provider-side cache blob.

use crate::fs;
use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use kubelogin_core::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Name of the per-directory encryption key.
pub const KEY_FILE: &str = "cache.key";

/// Byte storage for an opaque cache blob.
///
/// A missing blob is reported as `Error::NotFound` so callers can tell it
/// apart from storage failures.
pub trait CacheAccessor: Send + Sync {
    fn read(&self) -> Result<Vec<u8>>;
    fn write(&self, data: &[u8]) -> Result<()>;
    fn delete(&self) -> Result<()>;
}

/// AES-256-GCM encrypted file with a random key stored next to it.
///
/// Layout on disk is `nonce || ciphertext`.
pub struct EncryptedFileAccessor {
    path: PathBuf,
    key_path: PathBuf,
}

impl EncryptedFileAccessor {
    /// Create a new accessor for the blob at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let key_path = path
            .parent()
            .map(|dir| dir.join(KEY_FILE))
            .unwrap_or_else(|| PathBuf::from(KEY_FILE));
        Self { path, key_path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn cipher(&self, create: bool) -> Result<Aes256Gcm> {
        let key = match fs::read_optional(&self.key_path)? {
            Some(key) if key.len() == KEY_LEN => key,
            existing if create => self.create_key(existing.is_some())?,
            Some(_) => {
                return Err(Error::NotFound(format!(
                    "invalid cache key {}",
                    self.key_path.display()
                )));
            }
            None => return Err(Error::NotFound(self.key_path.display().to_string())),
        };
        Aes256Gcm::new_from_slice(&key)
            .map_err(|e| Error::config(format!("invalid cache key: {}", e)))
    }

    /// Create the key file; a concurrent creator's key wins over ours.
    fn create_key(&self, replace_invalid: bool) -> Result<Vec<u8>> {
        let key: [u8; KEY_LEN] = rand::random();
        if replace_invalid {
            fs::write_private(&self.key_path, &key)?;
        } else if !fs::write_private_new(&self.key_path, &key)? {
            debug!(path = %self.key_path.display(), "Using cache key created concurrently");
            return match fs::read_optional(&self.key_path)? {
                Some(existing) if existing.len() == KEY_LEN => Ok(existing),
                _ => Err(Error::config(format!(
                    "invalid cache key {}",
                    self.key_path.display()
                ))),
            };
        }
        debug!(path = %self.key_path.display(), "Created cache key");
        Ok(key.to_vec())
    }
}

impl CacheAccessor for EncryptedFileAccessor {
    fn read(&self) -> Result<Vec<u8>> {
        let data = fs::read_optional(&self.path)?
            .ok_or_else(|| Error::NotFound(self.path.display().to_string()))?;
        if data.len() < NONCE_LEN {
            return Err(Error::Serialization(format!(
                "cache file {} is truncated",
                self.path.display()
            )));
        }
        let cipher = self.cipher(false)?;
        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| Error::Serialization(format!("decryption failed: {}", e)))
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        let cipher = self.cipher(true)?;
        let nonce_bytes: [u8; NONCE_LEN] = rand::random();
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), data)
            .map_err(|e| Error::Serialization(format!("encryption failed: {}", e)))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        fs::write_private(&self.path, &out)
    }

    fn delete(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io_at(&self.path, e)),
        }
    }
}
