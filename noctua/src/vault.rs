//! Encrypted credential vault.
//!
//! Secrets live in two files next to the project database:
//!
//! * `vault.salt` - random 16-byte salt (unique per vault, not secret)
//! * `vault.enc`  - base64 of nonce + AES-256-GCM ciphertext over a JSON map
//!
//! The cipher key is derived from a user-supplied master password and the
//! salt with Argon2id. A failed decrypt on unlock is reported as
//! [`VaultError::WrongPassword`]; corrupt JSON after a successful decrypt is
//! [`VaultError::Corrupted`]. Tools that need the vault while it is locked
//! fail with a descriptive error; the process itself keeps running.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use serde_json::{Map, Value};

use crate::error::VaultError;

const SALT_FILE: &str = "vault.salt";
const ENC_FILE: &str = "vault.enc";
const SALT_SIZE: usize = 16;
const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;

fn derive_key(password: &str, salt: &[u8]) -> Result<[u8; KEY_SIZE], VaultError> {
    let mut key = [0u8; KEY_SIZE];
    argon2::Argon2::default()
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| VaultError::Corrupted(format!("key derivation: {}", e)))?;
    Ok(key)
}

/// Encrypted key-value credential store.
///
/// `get`/`set`/`delete`/`list_keys` operate on an in-memory map; every
/// mutation re-encrypts and rewrites `vault.enc`.
pub struct Vault {
    base_dir: PathBuf,
    cipher: Aes256Gcm,
    data: Mutex<Map<String, Value>>,
}

impl Vault {
    /// Create a new vault, overwriting any existing vault files.
    pub fn create(base_dir: impl AsRef<Path>, password: &str) -> Result<Self, VaultError> {
        let base = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base)?;

        let mut salt = [0u8; SALT_SIZE];
        rand::thread_rng().fill_bytes(&mut salt);
        std::fs::write(base.join(SALT_FILE), salt)?;

        let key = derive_key(password, &salt)?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| VaultError::Corrupted(e.to_string()))?;

        let vault = Self {
            base_dir: base,
            cipher,
            data: Mutex::new(Map::new()),
        };
        vault.save()?;
        tracing::info!(path = %vault.base_dir.display(), "vault created");
        Ok(vault)
    }

    /// Unlock an existing vault. Fails with [`VaultError::NotFound`] when the
    /// file pair is missing and [`VaultError::WrongPassword`] when decryption
    /// fails.
    pub fn unlock(base_dir: impl AsRef<Path>, password: &str) -> Result<Self, VaultError> {
        let base = base_dir.as_ref().to_path_buf();
        let salt_path = base.join(SALT_FILE);
        let enc_path = base.join(ENC_FILE);
        if !salt_path.exists() || !enc_path.exists() {
            return Err(VaultError::NotFound(base.display().to_string()));
        }

        let salt = std::fs::read(&salt_path)?;
        let key = derive_key(password, &salt)?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| VaultError::Corrupted(e.to_string()))?;

        let blob = std::fs::read_to_string(&enc_path)?;
        let raw = BASE64
            .decode(blob.trim())
            .map_err(|e| VaultError::Corrupted(format!("base64: {}", e)))?;
        if raw.len() < NONCE_SIZE {
            return Err(VaultError::Corrupted("blob too short".to_string()));
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_SIZE);
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| VaultError::WrongPassword)?;
        let data: Map<String, Value> = serde_json::from_slice(&plaintext)
            .map_err(|e| VaultError::Corrupted(e.to_string()))?;

        Ok(Self {
            base_dir: base,
            cipher,
            data: Mutex::new(data),
        })
    }

    /// Whether the vault file pair exists under `base_dir`.
    pub fn exists(base_dir: impl AsRef<Path>) -> bool {
        let base = base_dir.as_ref();
        base.join(SALT_FILE).exists() && base.join(ENC_FILE).exists()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.lock().expect("vault lock").get(key).cloned()
    }

    pub fn set(&self, key: &str, value: Value) -> Result<(), VaultError> {
        self.data
            .lock()
            .expect("vault lock")
            .insert(key.to_string(), value);
        self.save()
    }

    /// Returns true when the key existed.
    pub fn delete(&self, key: &str) -> Result<bool, VaultError> {
        let existed = self.data.lock().expect("vault lock").remove(key).is_some();
        if existed {
            self.save()?;
        }
        Ok(existed)
    }

    pub fn list_keys(&self) -> Vec<String> {
        self.data.lock().expect("vault lock").keys().cloned().collect()
    }

    fn save(&self) -> Result<(), VaultError> {
        let plaintext = {
            let data = self.data.lock().expect("vault lock");
            serde_json::to_vec(&*data).map_err(|e| VaultError::Corrupted(e.to_string()))?
        };
        let mut nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|e| VaultError::Corrupted(e.to_string()))?;
        let mut raw = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        raw.extend_from_slice(&nonce);
        raw.extend_from_slice(&ciphertext);
        std::fs::write(self.base_dir.join(ENC_FILE), BASE64.encode(raw))?;
        Ok(())
    }
}

/// Runtime-wide vault slot. Starts locked; boot (or a later `restart`)
/// installs the unlocked vault. Tools read through this so a vault that
/// never unlocks degrades to descriptive per-call errors instead of
/// failing the process.
#[derive(Clone, Default)]
pub struct SharedVault {
    inner: std::sync::Arc<std::sync::RwLock<Option<std::sync::Arc<Vault>>>>,
}

impl SharedVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, vault: std::sync::Arc<Vault>) {
        *self.inner.write().expect("vault slot lock") = Some(vault);
    }

    pub fn get(&self) -> Result<std::sync::Arc<Vault>, VaultError> {
        self.inner
            .read()
            .expect("vault slot lock")
            .clone()
            .ok_or(VaultError::Locked)
    }

    pub fn is_unlocked(&self) -> bool {
        self.inner.read().expect("vault slot lock").is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_set_unlock_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let vault = Vault::create(dir.path(), "master-pw").unwrap();
        vault
            .set("google.com", json!({"email": "me@example.com", "password": "s3cret"}))
            .unwrap();
        drop(vault);

        let vault = Vault::unlock(dir.path(), "master-pw").unwrap();
        let creds = vault.get("google.com").unwrap();
        assert_eq!(creds["email"], "me@example.com");
    }

    #[test]
    fn wrong_password_is_distinct_error() {
        let dir = tempfile::tempdir().unwrap();
        Vault::create(dir.path(), "right").unwrap();
        match Vault::unlock(dir.path(), "wrong") {
            Err(VaultError::WrongPassword) => {}
            other => panic!("expected WrongPassword, got {:?}", other.err()),
        }
    }

    #[test]
    fn missing_vault_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!Vault::exists(dir.path()));
        match Vault::unlock(dir.path(), "pw") {
            Err(VaultError::NotFound(_)) => {}
            other => panic!("expected NotFound, got {:?}", other.err()),
        }
    }

    #[test]
    fn delete_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let vault = Vault::create(dir.path(), "pw").unwrap();
        vault.set("a", json!(1)).unwrap();
        vault.set("b", json!(2)).unwrap();
        assert!(vault.delete("a").unwrap());
        assert!(!vault.delete("a").unwrap());
        assert_eq!(vault.list_keys(), vec!["b".to_string()]);
    }
}
