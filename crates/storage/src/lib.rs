use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::Mutex;

/// Storage trait for the session snapshot. Each save overwrites the previous
/// snapshot wholesale; there is no incremental format.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save(&self, data: &[u8]) -> Result<()>;
    async fn load(&self) -> Result<Option<Vec<u8>>>;
    async fn clear(&self) -> Result<()>;
}

/// Local filesystem-based store: one file under the data directory.
#[derive(Clone)]
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&base_dir)
            .context("Failed to create data directory")?;
        Ok(Self {
            path: base_dir.join("session.json"),
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl SnapshotStore for LocalStore {
    async fn save(&self, data: &[u8]) -> Result<()> {
        fs::write(&self.path, data)
            .await
            .with_context(|| format!("Failed to write snapshot {}", self.path.display()))?;
        tracing::debug!("Stored snapshot ({} bytes)", data.len());
        Ok(())
    }

    async fn load(&self) -> Result<Option<Vec<u8>>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = fs::read(&self.path)
            .await
            .with_context(|| format!("Failed to read snapshot {}", self.path.display()))?;
        tracing::debug!("Loaded snapshot ({} bytes)", data.len());
        Ok(Some(data))
    }

    async fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .await
                .with_context(|| format!("Failed to remove snapshot {}", self.path.display()))?;
        }
        Ok(())
    }
}

/// In-memory store for tests and embedders without durable storage.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<Option<Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn save(&self, data: &[u8]) -> Result<()> {
        *self.data.lock().await = Some(data.to_vec());
        Ok(())
    }

    async fn load(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.data.lock().await.clone())
    }

    async fn clear(&self) -> Result<()> {
        *self.data.lock().await = None;
        Ok(())
    }
}
