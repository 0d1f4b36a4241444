//! Document model: the on-the-wire unit stored in the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::NodeId;
use super::partition::PartitionName;

/// Raw payload bytes. Opaque to this layer.
pub type Blob = Vec<u8>;

/// Logical creation time of a blob. Only used for routing.
pub type Timestamp = DateTime<Utc>;

/// One stored document: the engine key plus its stored fields.
///
/// `source` is the field object written to the partition (see
/// [`crate::codec::PartitionTemplate`] for the field layout).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: NodeId,
    pub source: serde_json::Value,
}

impl Document {
    pub fn new(id: NodeId, source: serde_json::Value) -> Self {
        Self { id, source }
    }

    /// Stored field by name, if present.
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.source.get(name)
    }
}

/// A document found by the engine together with the partition holding it.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineHit {
    pub partition: PartitionName,
    pub document: Document,
}
