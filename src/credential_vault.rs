/*
 * Meeting Orchestrator
 * Copyright (c) 2024 Meeting Orchestrator Contributors
 *
 * This work is licensed under the Creative Commons Attribution-NonCommercial 4.0 International License.
 * To view a copy of this license, visit http://creativecommons.org/licenses/by-nc/4.0/
 *
 * You are free to share and adapt this work for non-commercial purposes with attribution.
 * Commercial use is prohibited without explicit written permission.
 */

use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use anyhow::{anyhow, Context, Result};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;

use crate::types::Platform;

const PBKDF2_ITERATIONS: u32 = 100_000;
/// Fixed per-store salt: the vault is local-only and its threat model is
/// "don't leave cookies lying around as plaintext", not multi-tenant
/// key separation, so a single salt per installation is sufficient.
const SALT: &[u8] = b"meeting-orchestrator-credential-vault-v1";
const NONCE_LEN: usize = 12;

fn derive_key(secret: &str) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(secret.as_bytes(), SALT, PBKDF2_ITERATIONS, &mut key);
    key
}

/// Opaque `load(platform)`/`save(platform, blob)` store for the out-of-scope
/// credential/cookie vault, per `spec.md` §9 Design Notes: one encrypted
/// file per platform, AES-256-GCM keyed by a PBKDF2-SHA256-derived key.
pub struct CredentialVault {
    root: PathBuf,
    cipher: Aes256Gcm,
}

impl CredentialVault {
    pub fn new(root: PathBuf, secret: &str) -> Self {
        let key_bytes = derive_key(secret);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
        Self { root, cipher }
    }

    fn path_for(&self, platform: Platform) -> PathBuf {
        self.root.join(format!("{platform}.vault"))
    }

    pub async fn save(&self, platform: Platform, blob: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .context("failed to create credential vault directory")?;

        let nonce_bytes = random_nonce();
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, blob)
            .map_err(|e| anyhow!("credential encryption failed: {e}"))?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&ciphertext);

        tokio::fs::write(self.path_for(platform), payload)
            .await
            .context("failed to write credential vault file")
    }

    pub async fn load(&self, platform: Platform) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(platform);
        if !Path::new(&path).exists() {
            return Ok(None);
        }

        let payload = tokio::fs::read(&path)
            .await
            .context("failed to read credential vault file")?;
        if payload.len() < NONCE_LEN {
            return Err(anyhow!("credential vault file is truncated"));
        }

        let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| anyhow!("credential decryption failed: {e}"))?;

        Ok(Some(plaintext))
    }
}

/// AES-GCM security depends entirely on never reusing a nonce under the same
/// key, so it is drawn from the OS CSPRNG rather than derived from wall-clock
/// time or a counter that resets across process restarts.
fn random_nonce() -> [u8; NONCE_LEN] {
    use rand::rngs::OsRng;
    use rand::RngCore;

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn round_trips_a_saved_blob() {
        let dir = tempdir().unwrap();
        let vault = CredentialVault::new(dir.path().to_path_buf(), "test-secret");
        vault.save(Platform::Gmeet, b"session-cookie-data").await.unwrap();
        let loaded = vault.load(Platform::Gmeet).await.unwrap();
        assert_eq!(loaded, Some(b"session-cookie-data".to_vec()));
    }

    #[tokio::test]
    async fn missing_platform_file_returns_none() {
        let dir = tempdir().unwrap();
        let vault = CredentialVault::new(dir.path().to_path_buf(), "test-secret");
        let loaded = vault.load(Platform::Teams).await.unwrap();
        assert_eq!(loaded, None);
    }

    #[tokio::test]
    async fn wrong_secret_fails_to_decrypt() {
        let dir = tempdir().unwrap();
        let vault = CredentialVault::new(dir.path().to_path_buf(), "correct-secret");
        vault.save(Platform::Gmeet, b"cookie").await.unwrap();

        let wrong_vault = CredentialVault::new(dir.path().to_path_buf(), "wrong-secret");
        assert!(wrong_vault.load(Platform::Gmeet).await.is_err());
    }
}
