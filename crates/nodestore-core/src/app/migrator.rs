//! BulkMigrator - 旧ストアからパーティションへの一括移行
//!
//! # フロー（バッチごと・厳密に逐次）
//! 1. キャンセル確認（処理中のバッチは最後まで流す）
//! 2. `RowSource::fetch_batch(after = カーソル)` で (timestamp, id) 昇順に取得
//! 3. 各行をエンコードし、パーティションごとに bulk 書き込み（パーティション間は並行）
//! 4. 先頭から連続して成功した行までチェックポイントを進めて保存
//!
//! # チェックポイントの不変条件
//! - `last_seen_row_key` 以前の行はすべてエンジンが受理済み
//! - 行が 1 件でも失敗したら、以降チェックポイントはその手前で止まる
//!   （カーソルは進み続け、失敗行はレポートに残る。再実行で upsert し直す）
//!
//! # 状態
//! Idle -> Running -> {Completed, Failed, Paused}

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::app::gateway::bulk_write_partition;
use crate::codec::BlobCodec;
use crate::config::NodestoreConfig;
use crate::domain::{
    Document, ItemFailure, MigrationCheckpoint, MigrationState, NodestoreError, PartitionName,
    RowKey,
};
use crate::observability::MigrationProgress;
use crate::ports::{
    CheckpointStore, Clock, Refresh, RowSource, SearchEngine, SourceRow, SystemClock,
};
use crate::routing::PartitionRouter;

/// Outcome of one `run`.
#[derive(Debug)]
pub struct MigrationReport {
    pub state: MigrationState,
    /// Last checkpoint reached; resume from here.
    pub checkpoint: MigrationCheckpoint,
    pub progress: MigrationProgress,
    /// Rows the engine did not acknowledge. A re-run from `checkpoint` retries them.
    pub failed_rows: Vec<ItemFailure>,
    /// Why the run ended in `Failed`.
    pub error: Option<NodestoreError>,
}

impl MigrationReport {
    /// Completed with every row acknowledged.
    pub fn is_clean(&self) -> bool {
        self.state == MigrationState::Completed && self.failed_rows.is_empty()
    }

    /// Ended early; a later run from `checkpoint` picks up the rest.
    pub fn is_resumable(&self) -> bool {
        self.state.is_resumable()
    }
}

struct BatchOutcome {
    /// Contiguous acknowledged prefix: (last key, row count).
    committed_prefix: Option<(RowKey, u64)>,
    committed: u64,
    failures: Vec<ItemFailure>,
    partitions: Vec<PartitionName>,
}

/// Copies rows from a [`RowSource`] into daily partitions.
pub struct BulkMigrator {
    source: Arc<dyn RowSource>,
    engine: Arc<dyn SearchEngine>,
    router: PartitionRouter,
    codec: BlobCodec,
    batch_size: usize,
    refresh: Refresh,
    clock: Arc<dyn Clock>,
    checkpoint_store: Option<Arc<dyn CheckpointStore>>,
    state: MigrationState,
}

impl BulkMigrator {
    pub fn new(
        source: Arc<dyn RowSource>,
        engine: Arc<dyn SearchEngine>,
        config: &NodestoreConfig,
    ) -> Result<Self, NodestoreError> {
        config.validate()?;
        Ok(Self {
            source,
            engine,
            router: PartitionRouter::new(config.partition_base_name.clone()),
            codec: BlobCodec::new(config.compress),
            batch_size: config.batch_size,
            refresh: config.durability.refresh(),
            clock: Arc::new(SystemClock),
            checkpoint_store: None,
            state: MigrationState::Idle,
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Persist the checkpoint after every batch.
    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoint_store = Some(store);
        self
    }

    pub fn state(&self) -> MigrationState {
        self.state
    }

    fn transition(&mut self, next: MigrationState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid migration transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(from = ?self.state, to = ?next, "migration state changed");
        self.state = next;
    }

    /// Resume from the configured checkpoint store (fresh start if it is empty).
    pub async fn run_from_store(
        &mut self,
        cancel: watch::Receiver<bool>,
    ) -> Result<MigrationReport, NodestoreError> {
        let checkpoint = match &self.checkpoint_store {
            Some(store) => store.load().await?,
            None => None,
        };
        Ok(self.run(checkpoint, cancel).await)
    }

    /// Migrate everything after `checkpoint` (or from the beginning).
    ///
    /// Setting `cancel` to `true` pauses the run before the next batch.
    pub async fn run(
        &mut self,
        checkpoint: Option<MigrationCheckpoint>,
        cancel: watch::Receiver<bool>,
    ) -> MigrationReport {
        // 前回の実行が終端状態でも、新しい実行は Idle から始める
        self.state = MigrationState::Idle;
        self.transition(MigrationState::Running);

        let mut checkpoint = match checkpoint {
            Some(checkpoint) => checkpoint,
            None => MigrationCheckpoint::start(self.estimate().await),
        };
        let estimate = checkpoint.rows_remaining_estimate;
        let mut cursor = checkpoint.last_seen_row_key.clone();
        let mut frozen = false;
        let mut progress = MigrationProgress::default();
        let mut failed_rows = Vec::new();

        info!(
            resume_after = ?cursor.as_ref().map(|k| k.id.as_str().to_string()),
            rows_estimate = ?estimate,
            batch_size = self.batch_size,
            "migration started"
        );

        let (state, error) = loop {
            if *cancel.borrow() {
                info!(rows_committed = progress.rows_committed, "migration paused");
                break (MigrationState::Paused, None);
            }

            let rows = match self.source.fetch_batch(cursor.as_ref(), self.batch_size).await {
                Ok(rows) => rows,
                Err(e) => {
                    error!(error = %e, "source fetch failed");
                    break (MigrationState::Failed, Some(NodestoreError::from(e)));
                }
            };
            let Some(last) = rows.last() else {
                break (MigrationState::Completed, None);
            };
            cursor = Some(last.key());

            let read = rows.len() as u64;
            let outcome = self.write_batch(rows).await;
            progress.rows_read += read;
            progress.batches += 1;
            progress.rows_committed += outcome.committed;
            progress.rows_failed += outcome.failures.len() as u64;
            progress
                .partitions_touched
                .extend(outcome.partitions.iter().map(|p| p.to_string()));

            if !frozen {
                if let Some((key, count)) = outcome.committed_prefix {
                    checkpoint.advance(key, count, self.clock.now());
                }
                // 失敗行があればここで凍結
                frozen = !outcome.failures.is_empty();
            }

            let batch_failed = outcome.committed == 0;
            let first_failure = outcome
                .failures
                .first()
                .map(|f| f.error.to_string())
                .unwrap_or_default();
            failed_rows.extend(outcome.failures);

            if let Err(e) = self.save_checkpoint(&checkpoint).await {
                error!(error = %e, "failed to persist migration checkpoint");
                break (MigrationState::Failed, Some(e));
            }

            debug!(
                batch = progress.batches,
                rows = read,
                committed = outcome.committed,
                failed = read - outcome.committed,
                progress = ?progress.ratio(estimate),
                "migration batch committed"
            );

            if batch_failed {
                error!(error = %first_failure, "no row of the batch was acknowledged, stopping");
                let err = NodestoreError::PartialBatchFailure {
                    failed: read as usize,
                    total: read as usize,
                };
                break (MigrationState::Failed, Some(err));
            }
        };

        debug_assert!(state.is_terminal(), "run ended in {state:?}");
        self.transition(state);
        info!(
            state = ?state,
            rows_read = progress.rows_read,
            rows_committed = progress.rows_committed,
            rows_failed = progress.rows_failed,
            "migration finished"
        );
        MigrationReport {
            state,
            checkpoint,
            progress,
            failed_rows,
            error,
        }
    }

    async fn estimate(&self) -> Option<u64> {
        match self.source.estimate_rows(None).await {
            Ok(n) => Some(n),
            Err(e) => {
                warn!(error = %e, "row estimate unavailable");
                None
            }
        }
    }

    async fn save_checkpoint(
        &self,
        checkpoint: &MigrationCheckpoint,
    ) -> Result<(), NodestoreError> {
        if let Some(store) = &self.checkpoint_store {
            store.save(checkpoint).await?;
        }
        Ok(())
    }

    async fn write_batch(&self, rows: Vec<SourceRow>) -> BatchOutcome {
        let mut results: Vec<Option<Result<(), NodestoreError>>> =
            rows.iter().map(|_| None).collect();
        let mut partitions_of: Vec<Option<PartitionName>> = rows.iter().map(|_| None).collect();
        let mut by_partition: BTreeMap<PartitionName, (Vec<usize>, Vec<Document>)> =
            BTreeMap::new();

        for (i, row) in rows.iter().enumerate() {
            let partition = self.router.partition_for(row.timestamp);
            partitions_of[i] = Some(partition.clone());
            match self.codec.encode(&row.id, &row.payload, row.timestamp) {
                Ok(doc) => {
                    let (indices, docs) = by_partition.entry(partition).or_default();
                    indices.push(i);
                    docs.push(doc);
                }
                Err(source) => {
                    results[i] = Some(Err(NodestoreError::Encode {
                        id: row.id.clone(),
                        source,
                    }));
                }
            }
        }

        let refresh = self.refresh;
        let writes = by_partition.into_iter().map(|(partition, (indices, docs))| async move {
            let written =
                bulk_write_partition(self.engine.as_ref(), &partition, docs, refresh).await;
            (partition, indices, written)
        });

        let mut partitions = Vec::new();
        for (partition, indices, written) in join_all(writes).await {
            if written.iter().any(Result::is_ok) {
                partitions.push(partition);
            }
            for (i, result) in indices.into_iter().zip(written) {
                results[i] = Some(result);
            }
        }

        let mut outcome = BatchOutcome {
            committed_prefix: None,
            committed: 0,
            failures: Vec::new(),
            partitions,
        };
        let mut prefix_open = true;
        for ((row, result), partition) in rows.into_iter().zip(results).zip(partitions_of) {
            match result {
                Some(Ok(())) => {
                    outcome.committed += 1;
                    if prefix_open {
                        let count = outcome.committed_prefix.as_ref().map_or(0, |(_, n)| *n);
                        outcome.committed_prefix = Some((row.key(), count + 1));
                    }
                }
                Some(Err(err)) => {
                    prefix_open = false;
                    outcome.failures.push(ItemFailure::new(row.id, partition, err));
                }
                None => {
                    prefix_open = false;
                    let err = NodestoreError::PartialBatchFailure { failed: 1, total: 1 };
                    outcome.failures.push(ItemFailure::new(row.id, partition, err));
                }
            }
        }
        outcome
    }
}
