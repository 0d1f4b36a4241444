//! Partition names (one physical index per UTC calendar day).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of a physical partition in the engine, e.g. `nodestore-2024-01-01`.
///
/// Names produced by the router always follow `<base>-YYYY-MM-DD`; names
/// listed back from the engine may carry extra suffixes and are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionName(String);

impl PartitionName {
    /// Wrap a name as reported by the engine.
    pub fn from_raw(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for PartitionName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
