//! Migration checkpoint: resumable progress marker for the bulk migrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::document::Timestamp;
use super::ids::NodeId;

/// Position of a row in the source ordering.
///
/// Rows are ordered by creation time with the id as tie-breaker, so two rows
/// sharing a timestamp still have a strict order. Field order matters for the
/// derived `Ord`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowKey {
    pub timestamp: Timestamp,
    pub id: NodeId,
}

impl RowKey {
    pub fn new(timestamp: Timestamp, id: NodeId) -> Self {
        Self { timestamp, id }
    }
}

/// Persisted migration progress.
///
/// Invariant: every source row at or before `last_seen_row_key` has been
/// acknowledged by the engine. Rows after it may or may not have been written;
/// replaying them is safe because writes are upserts.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MigrationCheckpoint {
    /// Last row committed (None = nothing committed yet).
    pub last_seen_row_key: Option<RowKey>,

    /// Advisory estimate of rows still to migrate.
    pub rows_remaining_estimate: Option<u64>,

    /// Rows committed up to `last_seen_row_key` across all runs.
    #[serde(default)]
    pub migrated_rows: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl MigrationCheckpoint {
    /// Checkpoint before any row was committed.
    pub fn start(rows_estimate: Option<u64>) -> Self {
        Self {
            last_seen_row_key: None,
            rows_remaining_estimate: rows_estimate,
            migrated_rows: 0,
            updated_at: None,
        }
    }

    /// Move the watermark past `key` after `committed` more rows were acknowledged.
    pub fn advance(&mut self, key: RowKey, committed: u64, now: DateTime<Utc>) {
        self.last_seen_row_key = Some(key);
        self.migrated_rows += committed;
        self.rows_remaining_estimate = self
            .rows_remaining_estimate
            .map(|remaining| remaining.saturating_sub(committed));
        self.updated_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn key(ts_secs: i64, id: &str) -> RowKey {
        RowKey::new(
            Utc.timestamp_opt(ts_secs, 0).unwrap(),
            NodeId::new(id).unwrap(),
        )
    }

    #[test]
    fn row_keys_order_by_time_then_id() {
        assert!(key(1, "b") < key(2, "a"));
        assert!(key(1, "a") < key(1, "b"));
    }

    #[test]
    fn advance_moves_watermark_and_counts() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let mut checkpoint = MigrationCheckpoint::start(Some(10));
        checkpoint.advance(key(5, "n5"), 3, now);

        assert_eq!(checkpoint.last_seen_row_key, Some(key(5, "n5")));
        assert_eq!(checkpoint.migrated_rows, 3);
        assert_eq!(checkpoint.rows_remaining_estimate, Some(7));
        assert_eq!(checkpoint.updated_at, Some(now));
    }

    #[test]
    fn remaining_estimate_never_underflows() {
        let now = Utc::now();
        let mut checkpoint = MigrationCheckpoint::start(Some(1));
        checkpoint.advance(key(1, "a"), 5, now);
        assert_eq!(checkpoint.rows_remaining_estimate, Some(0));
    }

    #[test]
    fn checkpoint_json_is_stable() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let mut checkpoint = MigrationCheckpoint::start(None);
        checkpoint.advance(key(0, "n0"), 1, now);

        let json = serde_json::to_value(&checkpoint).unwrap();
        assert_eq!(json["last_seen_row_key"]["id"], "n0");
        assert_eq!(json["migrated_rows"], 1);

        let back: MigrationCheckpoint = serde_json::from_value(json).unwrap();
        assert_eq!(back, checkpoint);
    }
}
