//! Encrypted vault for at-rest browser state.
//!
//! A vault is an opaque file holding one symmetrically-encrypted blob. The
//! cipher is XChaCha20-Poly1305 with a random nonce prepended to the
//! ciphertext; the 32-byte key comes from a configured environment variable
//! (see `--vault-pass-gen` for generating one). The cookie store persists
//! its jar through this interface and never touches the file directly.

use std::path::{Path, PathBuf};

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};
use thiserror::Error;
use tracing::info;

const NONCE_LEN: usize = 24;
pub const KEY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("no password found in ${0}")]
    NoPassword(String),
    #[error("vault password must be exactly {KEY_LEN} bytes")]
    BadPassword,
    #[error("vault file unavailable: {0}")]
    Io(#[from] std::io::Error),
    #[error("vault blob could not be decrypted")]
    Crypto,
}

/// Handle to one encrypted blob on disk.
pub struct Vault {
    path: PathBuf,
    key: [u8; KEY_LEN],
}

impl Vault {
    /// Open a vault with key material supplied directly.
    pub fn new(path: impl Into<PathBuf>, key: [u8; KEY_LEN]) -> Self {
        Self {
            path: path.into(),
            key,
        }
    }

    /// Open a vault whose key lives in the named environment variable.
    pub fn from_env(path: impl Into<PathBuf>, pass_env_var: &str) -> Result<Self, VaultError> {
        let pass = std::env::var(pass_env_var)
            .map_err(|_| VaultError::NoPassword(pass_env_var.to_string()))?;
        let bytes = pass.as_bytes();
        if bytes.len() != KEY_LEN {
            return Err(VaultError::BadPassword);
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(bytes);
        Ok(Self::new(path, key))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decrypt and return the blob's plaintext.
    pub fn read(&self) -> Result<Vec<u8>, VaultError> {
        let blob = std::fs::read(&self.path)?;
        if blob.len() < NONCE_LEN {
            return Err(VaultError::Crypto);
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&self.key));
        cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| VaultError::Crypto)
    }

    /// Encrypt `plaintext` under a fresh nonce and rewrite the file.
    pub fn write(&self, plaintext: &[u8]) -> Result<(), VaultError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&self.key));
        let ciphertext = cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext)
            .map_err(|_| VaultError::Crypto)?;
        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        std::fs::write(&self.path, blob)?;
        info!(target: "vault", path = %self.path.display(), "vault written");
        Ok(())
    }
}

/// Generate a fresh vault password suitable for the password env var.
pub fn new_vault_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(KEY_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_vault(name: &str) -> (Vault, PathBuf) {
        let dir = std::env::temp_dir().join(format!(
            "uggcli_vault_{}_{}",
            name,
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("cookies.json.encrypted");
        (Vault::new(&path, [7u8; KEY_LEN]), dir)
    }

    #[test]
    fn round_trips_a_blob() {
        let (vault, dir) = temp_vault("roundtrip");
        vault.write(b"jar contents").unwrap();
        assert_eq!(vault.read().unwrap(), b"jar contents");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let (vault, dir) = temp_vault("wrongkey");
        vault.write(b"secret").unwrap();
        let other = Vault::new(vault.path(), [8u8; KEY_LEN]);
        assert!(matches!(other.read(), Err(VaultError::Crypto)));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_file_is_io_error() {
        let vault = Vault::new("/definitely/not/here.encrypted", [0u8; KEY_LEN]);
        assert!(matches!(vault.read(), Err(VaultError::Io(_))));
    }

    #[test]
    fn generated_password_is_key_sized() {
        let pass = new_vault_password();
        assert_eq!(pass.len(), KEY_LEN);
        assert!(pass.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
