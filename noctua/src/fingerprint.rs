//! Agent fingerprint: an identity anchor derived at boot and compared across
//! boots.
//!
//! The fingerprint is a hex SHA-256 over stable configuration fields and a
//! hash of the vault salt. It is stored in the vault under a reserved key;
//! on later boots the stored value is compared against the recomputed one
//! and the status reports `verified`, or `changed` on config drift (the
//! vault entry is re-stamped, keeping the previous fingerprint). It feeds
//! the runtime-state block and is never sent to external channels.

use std::path::Path;

use serde_json::json;
use sha2::{Digest, Sha256};

use crate::vault::Vault;

const VAULT_KEY: &str = "_agent_fingerprint";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FingerprintStatus {
    Created,
    Verified,
    Changed,
    /// No vault available; the runtime-state block reports it as such.
    Unavailable,
}

impl FingerprintStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FingerprintStatus::Created => "created",
            FingerprintStatus::Verified => "verified",
            FingerprintStatus::Changed => "changed",
            FingerprintStatus::Unavailable => "unavailable",
        }
    }
}

fn sha256_hex(input: &[u8]) -> String {
    hex::encode(Sha256::digest(input))
}

/// Hash the identity-defining config fields. Volatile runtime settings
/// (budgets, wakeup intervals) are deliberately excluded.
pub fn compute_config_hash(agent_name: &str, project_dir: &Path, permission_mode: &str) -> String {
    let stable = json!({
        "agent_name": agent_name,
        "project_dir": project_dir.display().to_string(),
        "permission_mode": permission_mode,
    });
    sha256_hex(stable.to_string().as_bytes())
}

/// Hash of the vault salt file; empty string when there is no vault.
pub fn compute_salt_hash(project_dir: &Path) -> String {
    match std::fs::read(project_dir.join("vault.salt")) {
        Ok(bytes) => sha256_hex(&bytes),
        Err(_) => String::new(),
    }
}

/// Deterministic fingerprint over config hash and salt hash.
pub fn generate(config_hash: &str, salt_hash: &str) -> String {
    let material = format!("noctua:fingerprint:{}:{}", config_hash, salt_hash);
    sha256_hex(material.as_bytes())
}

/// Look up or stamp the fingerprint in the vault.
pub fn get_or_create(
    vault: &Vault,
    config_hash: &str,
    salt_hash: &str,
) -> (String, FingerprintStatus) {
    let current = generate(config_hash, salt_hash);

    let stored = vault
        .get(VAULT_KEY)
        .and_then(|v| v.get("fingerprint").and_then(|f| f.as_str().map(String::from)));

    match stored {
        None => {
            let _ = vault.set(
                VAULT_KEY,
                json!({
                    "fingerprint": current,
                    "config_hash": config_hash,
                    "vault_salt_hash": salt_hash,
                }),
            );
            tracing::info!(fingerprint = %&current[..8], "agent fingerprint created");
            (current, FingerprintStatus::Created)
        }
        Some(prev) if prev == current => {
            tracing::debug!("agent fingerprint verified");
            (current, FingerprintStatus::Verified)
        }
        Some(prev) => {
            let _ = vault.set(
                VAULT_KEY,
                json!({
                    "fingerprint": current,
                    "config_hash": config_hash,
                    "vault_salt_hash": salt_hash,
                    "previous_fingerprint": prev,
                }),
            );
            tracing::warn!(
                from = %&prev[..8.min(prev.len())],
                to = %&current[..8],
                "agent fingerprint changed (config drift)"
            );
            (current, FingerprintStatus::Changed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_across_boots() {
        let a = generate("cfg", "salt");
        let b = generate("cfg", "salt");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn sensitive_to_inputs() {
        assert_ne!(generate("cfg", "salt"), generate("cfg2", "salt"));
        assert_ne!(generate("cfg", "salt"), generate("cfg", "salt2"));
    }

    #[test]
    fn created_then_verified_then_changed() {
        let dir = tempfile::tempdir().unwrap();
        let vault = Vault::create(dir.path(), "pw").unwrap();

        let (fp1, status) = get_or_create(&vault, "cfg", "salt");
        assert_eq!(status, FingerprintStatus::Created);

        let (fp2, status) = get_or_create(&vault, "cfg", "salt");
        assert_eq!(status, FingerprintStatus::Verified);
        assert_eq!(fp1, fp2);

        let (fp3, status) = get_or_create(&vault, "cfg-drifted", "salt");
        assert_eq!(status, FingerprintStatus::Changed);
        assert_ne!(fp1, fp3);

        let stored = vault.get("_agent_fingerprint").unwrap();
        assert_eq!(stored["previous_fingerprint"], fp1.as_str());
    }

    #[test]
    fn salt_hash_empty_without_vault() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(compute_salt_hash(dir.path()), "");
    }
}
