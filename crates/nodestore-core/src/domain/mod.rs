//! Domain model (ids, partitions, documents, checkpoints, outcomes, errors).

pub mod checkpoint;
pub mod document;
pub mod errors;
pub mod ids;
pub mod outcome;
pub mod partition;
pub mod state;

pub use self::checkpoint::{MigrationCheckpoint, RowKey};
pub use self::document::{Blob, Document, EngineHit, Timestamp};
pub use self::errors::{CodecError, ErrorKind, NodestoreError};
pub use self::ids::NodeId;
pub use self::outcome::{BatchReport, CleanupReport, ItemFailure, MultiGetOutcome};
pub use self::partition::PartitionName;
pub use self::state::MigrationState;
