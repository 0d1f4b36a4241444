//! RowSource port - 移行元（リレーショナル DB）のカーソル
//!
//! 移行処理からは「作成時刻順に並んだ行をページングで読む」能力としてのみ見えます。
//!
//! # 設計原則
//! - 行は (timestamp, id) の昇順で返す
//! - `after` より後ろの行だけを返す（カーソルは前にしか進まない）
//! - 空のバッチ = 読み切り

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Blob, NodeId, RowKey, Timestamp};

/// One row of the source table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    pub id: NodeId,
    pub payload: Blob,
    pub timestamp: Timestamp,
}

impl SourceRow {
    pub fn new(id: NodeId, payload: impl Into<Blob>, timestamp: Timestamp) -> Self {
        Self {
            id,
            payload: payload.into(),
            timestamp,
        }
    }

    pub fn key(&self) -> RowKey {
        RowKey::new(self.timestamp, self.id.clone())
    }
}

/// SourceError は移行元の読み取りエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("source connection lost: {0}")]
    ConnectionLost(String),

    #[error("source query failed: {0}")]
    Query(String),

    #[error("source row is malformed: {0}")]
    MalformedRow(String),
}

/// RowSource は移行元テーブルのページングカーソル
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Up to `limit` rows strictly after `after`, ascending.
    async fn fetch_batch(
        &self,
        after: Option<&RowKey>,
        limit: usize,
    ) -> Result<Vec<SourceRow>, SourceError>;

    /// Advisory count of rows after `after` (used for progress only).
    async fn estimate_rows(&self, after: Option<&RowKey>) -> Result<u64, SourceError>;
}
