//! Outcome model: structured per-item results for multi-item operations.
//!
//! Multi/bulk operations never collapse into a single boolean. Callers get the
//! exact set of items that failed (with partition context) so they can retry
//! only that subset.

use std::collections::HashMap;

use super::document::Blob;
use super::errors::NodestoreError;
use super::ids::NodeId;
use super::partition::PartitionName;

/// One item of a multi/bulk operation that did not go through.
#[derive(Debug)]
pub struct ItemFailure {
    pub id: NodeId,
    pub partition: Option<PartitionName>,
    pub error: NodestoreError,
}

impl ItemFailure {
    pub fn new(id: NodeId, partition: Option<PartitionName>, error: NodestoreError) -> Self {
        Self {
            id,
            partition,
            error,
        }
    }
}

/// Per-item result of `set_multi` / `delete_multi`.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<NodeId>,
    pub failed: Vec<ItemFailure>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Ids to hand back to a retry.
    pub fn failed_ids(&self) -> Vec<NodeId> {
        self.failed.iter().map(|f| f.id.clone()).collect()
    }

    pub fn merge(&mut self, other: BatchReport) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
    }

    /// Collapse into a `Result` for callers that only need pass/fail.
    pub fn into_result(self) -> Result<Vec<NodeId>, NodestoreError> {
        if self.failed.is_empty() {
            Ok(self.succeeded)
        } else {
            Err(NodestoreError::PartialBatchFailure {
                failed: self.failed.len(),
                total: self.total(),
            })
        }
    }
}

/// Result of `get_multi`: found blobs plus documents that failed to decode.
///
/// Missing ids appear in neither collection.
#[derive(Debug, Default)]
pub struct MultiGetOutcome {
    pub blobs: HashMap<NodeId, Blob>,
    pub corrupt: Vec<ItemFailure>,
}

/// Result of a retention run.
#[derive(Debug, Default)]
pub struct CleanupReport {
    /// Partitions dropped (or already gone).
    pub dropped: Vec<PartitionName>,

    /// Partitions whose drop failed; other partitions were not affected.
    pub failed: Vec<NodestoreError>,

    /// Names that do not parse as `<base>-YYYY-MM-DD[-suffix]`.
    pub skipped: Vec<PartitionName>,

    /// Partitions on or after the cutoff date.
    pub retained: usize,
}

impl CleanupReport {
    pub fn total_checked(&self) -> usize {
        self.dropped.len() + self.failed.len() + self.skipped.len() + self.retained
    }
}
