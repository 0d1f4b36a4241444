//! Domain identifiers.
//!
//! NodeId は呼び出し側が採番する不透明な文字列です（このクレートでは生成しない）。
//! エンジン上ではパーティション内のドキュメントキーとしてそのまま使われます。

use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::NodestoreError;

/// Identifier of a stored node (one blob per id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(String);

impl NodeId {
    /// 検証付きで NodeId を作成
    ///
    /// # エラー
    /// - 空文字列
    /// - 制御文字を含む（エンジンのキーとして扱えない）
    pub fn new(value: impl Into<String>) -> Result<Self, NodestoreError> {
        let value = value.into();
        if value.is_empty() {
            return Err(NodestoreError::InvalidNodeId {
                value,
                reason: "id cannot be empty",
            });
        }
        if value.chars().any(char::is_control) {
            return Err(NodestoreError::InvalidNodeId {
                value,
                reason: "id cannot contain control characters",
            });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for NodeId {
    type Error = NodestoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for NodeId {
    type Error = NodestoreError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_opaque_ids() {
        let id = NodeId::new("5f0c1b2a:event:1").unwrap();
        assert_eq!(id.as_str(), "5f0c1b2a:event:1");
        assert_eq!(id.to_string(), "5f0c1b2a:event:1");
    }

    #[test]
    fn rejects_empty_id() {
        let err = NodeId::new("").unwrap_err();
        assert!(matches!(err, NodestoreError::InvalidNodeId { .. }));
    }

    #[test]
    fn rejects_control_characters() {
        assert!(NodeId::new("abc\n").is_err());
        assert!(NodeId::try_from("a\0b").is_err());
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = NodeId::new("node-1").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"node-1\"");

        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);

        // 空文字列は deserialize でも拒否される
        assert!(serde_json::from_str::<NodeId>("\"\"").is_err());
    }
}
