//! CheckpointStore port - 移行チェックポイントの保存先
//!
//! # 実装
//! - **InMemoryCheckpointStore**: テスト用
//! - **JsonFileCheckpointStore**: JSON ファイル（一時ファイル + rename で置き換え）

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::MigrationCheckpoint;

/// CheckpointError はチェックポイント保存先のエラー
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
}

/// CheckpointStore は移行の進捗を永続化
///
/// # 設計原則
/// - save は上書き（最後に保存したものだけが意味を持つ）
/// - load で None = 未開始
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self) -> Result<Option<MigrationCheckpoint>, CheckpointError>;

    async fn save(&self, checkpoint: &MigrationCheckpoint) -> Result<(), CheckpointError>;

    async fn clear(&self) -> Result<(), CheckpointError>;
}
