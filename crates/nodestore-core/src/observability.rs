use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Counters of one migration run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationProgress {
    pub rows_read: u64,
    pub rows_committed: u64,
    pub rows_failed: u64,
    pub batches: u64,
    pub partitions_touched: BTreeSet<String>,
}

impl MigrationProgress {
    /// Share of the estimate already committed, if an estimate exists.
    pub fn ratio(&self, estimate: Option<u64>) -> Option<f64> {
        match estimate {
            Some(0) => Some(1.0),
            Some(total) => Some((self.rows_committed as f64 / total as f64).min(1.0)),
            None => None,
        }
    }
}
