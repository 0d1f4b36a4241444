//! Errors - エラー型と分類
//!
//! # 分類
//! - 読み取りミス（NotFound）は呼び出し側にとって想定内の結果
//! - ルーティング・コーデックのエラーは決定的（リトライしても結果は変わらない）
//! - エンジン呼び出しの失敗はトランスポート側でリトライ済みのものが上がってくる

use thiserror::Error;

use super::ids::NodeId;
use super::partition::PartitionName;
use crate::ports::checkpoint_store::CheckpointError;
use crate::ports::engine::EngineError;
use crate::ports::row_source::SourceError;

/// ErrorKind は運用上の分類
///
/// - Transient: 一時的なエラー（リトライ推奨）
/// - Permanent: 恒久的なエラー（リトライ無意味）
/// - Infrastructure: インフラエラー（移行元 DB / checkpoint 保存先の障害）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

/// Failure to turn a blob into a document or back.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("field '{0}' is missing")]
    MissingField(&'static str),

    #[error("field '{field}' is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("timestamp '{0}' is not a valid RFC 3339 date")]
    InvalidTimestamp(String),

    #[error("unknown payload encoding '{0}'")]
    UnknownEncoding(String),

    #[error("payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload (de)compression failed: {0}")]
    Compression(#[from] std::io::Error),
}

/// NodestoreError はストレージ層のエラー
#[derive(Debug, Error)]
pub enum NodestoreError {
    #[error("node '{id}' not found")]
    NotFound { id: NodeId },

    #[error("corrupt document for node '{id}' in partition '{partition}': {source}")]
    CorruptDocument {
        id: NodeId,
        partition: PartitionName,
        source: CodecError,
    },

    #[error("failed to encode node '{id}': {source}")]
    Encode { id: NodeId, source: CodecError },

    #[error("engine {operation} on '{target}' failed: {source}")]
    Engine {
        operation: &'static str,
        target: String,
        id: Option<NodeId>,
        source: EngineError,
    },

    #[error("{failed} of {total} items failed")]
    PartialBatchFailure { failed: usize, total: usize },

    #[error("failed to drop partition '{partition}': {source}")]
    PartitionDropFailure {
        partition: PartitionName,
        source: EngineError,
    },

    #[error("node '{id}' still has a copy in partition '{partition}' after delete")]
    DeleteIncomplete { id: NodeId, partition: PartitionName },

    #[error("deleting node '{id}' requires a timestamp hint")]
    DeleteRequiresTimestamp { id: NodeId },

    #[error("invalid node id '{value}': {reason}")]
    InvalidNodeId { value: String, reason: &'static str },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

impl NodestoreError {
    pub(crate) fn engine(
        operation: &'static str,
        target: impl Into<String>,
        id: Option<&NodeId>,
        source: EngineError,
    ) -> Self {
        Self::Engine {
            operation,
            target: target.into(),
            id: id.cloned(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Engine { source, .. } | Self::PartitionDropFailure { source, .. } => {
                if source.is_transient() {
                    ErrorKind::Transient
                } else {
                    ErrorKind::Permanent
                }
            }
            Self::PartialBatchFailure { .. } | Self::DeleteIncomplete { .. } => {
                ErrorKind::Transient
            }
            Self::Source(_) | Self::Checkpoint(_) => ErrorKind::Infrastructure,
            Self::NotFound { .. }
            | Self::CorruptDocument { .. }
            | Self::Encode { .. }
            | Self::DeleteRequiresTimestamp { .. }
            | Self::InvalidNodeId { .. }
            | Self::InvalidConfig(_) => ErrorKind::Permanent,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> NodeId {
        NodeId::new(id).unwrap()
    }

    #[test]
    fn display_carries_context() {
        let err = NodestoreError::engine(
            "bulk_write",
            "nodestore-2024-01-01",
            Some(&node("n1")),
            EngineError::Unavailable("connection refused".into()),
        );
        let msg = err.to_string();
        assert!(msg.contains("bulk_write"));
        assert!(msg.contains("nodestore-2024-01-01"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn engine_errors_are_classified_by_transience() {
        let transient = NodestoreError::engine(
            "get",
            "nodestore",
            None,
            EngineError::Timeout("30s".into()),
        );
        assert_eq!(transient.kind(), ErrorKind::Transient);

        let permanent = NodestoreError::engine(
            "get",
            "nodestore",
            None,
            EngineError::Rejected("mapping conflict".into()),
        );
        assert_eq!(permanent.kind(), ErrorKind::Permanent);
    }

    #[test]
    fn codec_and_routing_errors_are_permanent() {
        let err = NodestoreError::CorruptDocument {
            id: node("n1"),
            partition: PartitionName::from_raw("nodestore-2024-01-01"),
            source: CodecError::MissingField("data"),
        };
        assert_eq!(err.kind(), ErrorKind::Permanent);
        assert!(!err.is_not_found());
        assert!(NodestoreError::NotFound { id: node("n1") }.is_not_found());
    }

    #[test]
    fn incomplete_delete_is_retryable() {
        let err = NodestoreError::DeleteIncomplete {
            id: node("n1"),
            partition: PartitionName::from_raw("nodestore-2024-01-20"),
        };
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert!(err.to_string().contains("nodestore-2024-01-20"));
    }

    #[test]
    fn source_errors_are_infrastructure() {
        let err: NodestoreError = SourceError::ConnectionLost("reset by peer".into()).into();
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
    }
}
