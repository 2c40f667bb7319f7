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

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// Durable storage for recorded audio and the JSON records that describe it,
/// per `spec.md` §6. Paths are caller-supplied, relative, forward-slash
/// separated keys (`{meeting_id}/{session_id}/{file}.wav`).
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put_audio(&self, relative_path: &str, bytes: &[u8]) -> Result<()>;
    async fn put_json_value(&self, relative_path: &str, value: Value) -> Result<()>;
}

#[async_trait]
pub trait ArtifactStoreExt {
    async fn put_json<T: Serialize + Sync>(&self, relative_path: &str, value: &T) -> Result<()>;
}

#[async_trait]
impl<S: ArtifactStore + ?Sized> ArtifactStoreExt for S {
    async fn put_json<T: Serialize + Sync>(&self, relative_path: &str, value: &T) -> Result<()> {
        let json = serde_json::to_value(value).context("failed to serialize artifact")?;
        self.put_json_value(relative_path, json).await
    }
}

/// Writes under `data_dir`, creating parent directories as needed — the
/// local-filesystem half of the out-of-scope storage backend.
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn resolve(&self, relative_path: &str) -> PathBuf {
        self.root.join(relative_path)
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn put_audio(&self, relative_path: &str, bytes: &[u8]) -> Result<()> {
        let path = self.resolve(relative_path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create directory for {}", path.display()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("failed to write audio artifact {}", path.display()))
    }

    async fn put_json_value(&self, relative_path: &str, value: Value) -> Result<()> {
        let path = self.resolve(relative_path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create directory for {}", path.display()))?;
        }
        let rendered = serde_json::to_vec_pretty(&value).context("failed to render json artifact")?;
        tokio::fs::write(&path, rendered)
            .await
            .with_context(|| format!("failed to write json artifact {}", path.display()))
    }
}

/// Mirrors a write to an external blob/event-stream service (the
/// out-of-scope `artifact_store_endpoint`), tolerating outages by logging.
pub struct HttpArtifactStore {
    local: LocalArtifactStore,
    client: reqwest::Client,
    endpoint: String,
}

impl HttpArtifactStore {
    pub fn new(local_root: PathBuf, endpoint: String) -> Self {
        Self {
            local: LocalArtifactStore::new(local_root),
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl ArtifactStore for HttpArtifactStore {
    async fn put_audio(&self, relative_path: &str, bytes: &[u8]) -> Result<()> {
        self.local.put_audio(relative_path, bytes).await?;
        let url = format!("{}/{}", self.endpoint.trim_end_matches('/'), relative_path);
        if let Err(e) = self
            .client
            .put(&url)
            .header("content-type", "audio/wav")
            .body(bytes.to_vec())
            .send()
            .await
        {
            tracing::warn!(error = %e, url = %url, "remote artifact mirror failed for audio");
        }
        Ok(())
    }

    async fn put_json_value(&self, relative_path: &str, value: Value) -> Result<()> {
        self.local.put_json_value(relative_path, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[derive(Serialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[tokio::test]
    async fn local_store_writes_audio_and_json_under_root() {
        let dir = tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path().to_path_buf());

        store.put_audio("m1/s1/chunk.wav", b"RIFF....").await.unwrap();
        let sample = Sample {
            name: "chunk_000".to_string(),
            count: 3,
        };
        store
            .put_json("chunks/m1/s1/chunk_000.json", &sample)
            .await
            .unwrap();

        let audio_path = dir.path().join("m1/s1/chunk.wav");
        let json_path = dir.path().join("chunks/m1/s1/chunk_000.json");
        assert!(audio_path.exists());
        assert!(json_path.exists());

        let content = tokio::fs::read_to_string(&json_path).await.unwrap();
        assert!(content.contains("chunk_000"));
    }
}
