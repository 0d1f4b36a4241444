//! CheckpointStore の実装
//!
//! - **InMemoryCheckpointStore**: テスト用（保存履歴も残す）
//! - **JsonFileCheckpointStore**: JSON ファイル。一時ファイルに書いてから rename する

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::domain::MigrationCheckpoint;
use crate::ports::{CheckpointError, CheckpointStore};

#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    saved: Mutex<Vec<MigrationCheckpoint>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a checkpoint (as left by an earlier run).
    pub fn with_checkpoint(checkpoint: MigrationCheckpoint) -> Self {
        Self {
            saved: Mutex::new(vec![checkpoint]),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<MigrationCheckpoint>> {
        self.saved.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every checkpoint saved so far, oldest first.
    pub fn history(&self) -> Vec<MigrationCheckpoint> {
        self.lock().clone()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self) -> Result<Option<MigrationCheckpoint>, CheckpointError> {
        Ok(self.lock().last().cloned())
    }

    async fn save(&self, checkpoint: &MigrationCheckpoint) -> Result<(), CheckpointError> {
        self.lock().push(checkpoint.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), CheckpointError> {
        self.lock().clear();
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct JsonFileCheckpointStore {
    path: PathBuf,
}

impl JsonFileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl CheckpointStore for JsonFileCheckpointStore {
    async fn load(&self) -> Result<Option<MigrationCheckpoint>, CheckpointError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, checkpoint: &MigrationCheckpoint) -> Result<(), CheckpointError> {
        let bytes = serde_json::to_vec_pretty(checkpoint)?;
        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), CheckpointError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
