//! SearchEngine port - 検索エンジンクラスタ（Elasticsearch 互換）
//!
//! エンジンが唯一の正本（source of truth）です。ゲートウェイ・リテンション・
//! 移行処理はこの trait 越しにしかデータへ触れません。
//!
//! # 設計原則
//! - 接続・TLS・リトライはトランスポート実装側の責務
//! - すべての呼び出しは失敗しうるネットワーク呼び出しとして扱う
//! - 成功は明示的な応答でのみ判断する（応答なしを成功とみなさない）

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Document, EngineHit, PartitionName};

/// Write visibility requested from the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Refresh {
    /// Return once accepted; visibility follows the engine's refresh cycle.
    None,

    /// Return once the write is visible to searches.
    WaitFor,
}

/// EngineError はエンジン呼び出しの失敗
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("engine unavailable: {0}")]
    Unavailable(String),

    #[error("engine timed out: {0}")]
    Timeout(String),

    #[error("target not found: {0}")]
    NotFound(String),

    #[error("version conflict: {0}")]
    Conflict(String),

    #[error("request rejected: {0}")]
    Rejected(String),
}

impl EngineError {
    /// Could the same call succeed later without any change on our side?
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::Unavailable(_) | EngineError::Timeout(_) | EngineError::Conflict(_)
        )
    }
}

/// Per-item result of a bulk write, in request order.
pub type BulkItemResult = Result<(), EngineError>;

/// SearchEngine はパーティション化されたドキュメントストア
///
/// `target` はパーティション名またはエイリアス名（全パーティションを束ねる
/// 論理名）のどちらでもよい。
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Fetch one document by key.
    async fn get_by_key(&self, target: &str, key: &str) -> Result<Option<EngineHit>, EngineError>;

    /// Fetch several documents by key; missing keys are absent from the result.
    async fn multi_get(
        &self,
        target: &str,
        keys: &[String],
    ) -> Result<Vec<EngineHit>, EngineError> {
        let mut hits = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(hit) = self.get_by_key(target, key).await? {
                hits.push(hit);
            }
        }
        Ok(hits)
    }

    /// Upsert documents into one partition (created on first write).
    ///
    /// `Err` means the whole request failed; `Ok` carries one result per
    /// document in request order.
    async fn bulk_write(
        &self,
        partition: &PartitionName,
        documents: Vec<Document>,
        refresh: Refresh,
    ) -> Result<Vec<BulkItemResult>, EngineError>;

    /// Delete one document; `Ok(false)` if it did not exist.
    async fn delete_by_key(
        &self,
        partition: &PartitionName,
        key: &str,
        refresh: Refresh,
    ) -> Result<bool, EngineError>;

    /// Delete every document matching one of `keys` under `target`; returns
    /// the number removed.
    async fn delete_by_query(
        &self,
        target: &str,
        keys: &[String],
        refresh: Refresh,
    ) -> Result<u64, EngineError>;

    /// Partitions attached to the alias for `base_name`.
    async fn list_partitions(&self, base_name: &str) -> Result<Vec<PartitionName>, EngineError>;

    /// Drop a whole partition.
    async fn drop_partition(&self, partition: &PartitionName) -> Result<(), EngineError>;

    /// Connectivity check.
    async fn ping(&self) -> Result<(), EngineError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors() {
        assert!(EngineError::Unavailable("down".into()).is_transient());
        assert!(EngineError::Timeout("30s".into()).is_transient());
        assert!(EngineError::Conflict("seq_no".into()).is_transient());
        assert!(!EngineError::NotFound("idx".into()).is_transient());
        assert!(!EngineError::Rejected("400".into()).is_transient());
    }
}
