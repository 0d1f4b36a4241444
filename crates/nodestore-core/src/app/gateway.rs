//! NodeStore - Storage Gateway
//!
//! get / set / delete とそれぞれの multi 版を、パーティションルーターと
//! コーデックを通してエンジン操作に変換します。ゲートウェイ自身は状態を持ちません。
//!
//! # 読み取り
//! - パーティションを知らない読み取りはエイリアス越しにキーで引く
//!
//! # 書き込み
//! - タイムスタンプからパーティションを決め、キー = NodeId で upsert（冪等）
//! - multi 版はパーティションごとに 1 回の bulk 呼び出し。パーティション間は並行
//!
//! # 削除
//! - タイムスタンプのヒントがあれば該当パーティションで 1 件削除
//! - なければ `DeleteFallback` に従う（resolve / query / reject）

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::codec::BlobCodec;
use crate::config::{DeleteFallback, Durability, NodestoreConfig};
use crate::domain::{
    BatchReport, Blob, Document, EngineHit, ItemFailure, MultiGetOutcome, NodeId,
    NodestoreError, PartitionName, Timestamp,
};
use crate::ports::{EngineError, Refresh, SearchEngine};
use crate::routing::PartitionRouter;

/// Upper bound on resolve-then-delete rounds for one id (one round per
/// orphaned copy).
const MAX_RESOLVE_ROUNDS: usize = 16;

/// Per-call write options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Overrides the configured durability for this call.
    pub durability: Option<Durability>,
}

impl SetOptions {
    pub fn sync() -> Self {
        Self {
            durability: Some(Durability::Sync),
        }
    }
}

/// One entry of `set_multi`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeWrite {
    pub id: NodeId,
    pub blob: Blob,
    pub timestamp: Timestamp,
}

impl NodeWrite {
    pub fn new(id: NodeId, blob: impl Into<Blob>, timestamp: Timestamp) -> Self {
        Self {
            id,
            blob: blob.into(),
            timestamp,
        }
    }
}

/// Storage Gateway over a [`SearchEngine`].
pub struct NodeStore {
    engine: Arc<dyn SearchEngine>,
    router: PartitionRouter,
    codec: BlobCodec,
    config: NodestoreConfig,
}

impl NodeStore {
    pub fn new(
        engine: Arc<dyn SearchEngine>,
        config: NodestoreConfig,
    ) -> Result<Self, NodestoreError> {
        config.validate()?;
        Ok(Self {
            router: PartitionRouter::new(config.partition_base_name.clone()),
            codec: BlobCodec::new(config.compress),
            engine,
            config,
        })
    }

    pub fn config(&self) -> &NodestoreConfig {
        &self.config
    }

    pub fn router(&self) -> &PartitionRouter {
        &self.router
    }

    pub fn engine(&self) -> &Arc<dyn SearchEngine> {
        &self.engine
    }

    fn alias(&self) -> &str {
        self.config.alias()
    }

    fn refresh(&self, options: SetOptions) -> Refresh {
        options
            .durability
            .unwrap_or(self.config.durability)
            .refresh()
    }

    pub async fn ping(&self) -> Result<(), NodestoreError> {
        self.engine
            .ping()
            .await
            .map_err(|e| NodestoreError::engine("ping", self.alias(), None, e))
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    pub async fn get(&self, id: &NodeId) -> Result<Blob, NodestoreError> {
        let Some(hit) = self.lookup(id).await? else {
            debug!(doc_id = %id, "document not found");
            return Err(NodestoreError::NotFound { id: id.clone() });
        };
        let (blob, _) = self.decode_hit(id, &hit)?;
        Ok(blob)
    }

    /// Missing ids are absent from the result; corrupt documents are skipped
    /// and reported per item.
    pub async fn get_multi(&self, ids: &[NodeId]) -> Result<MultiGetOutcome, NodestoreError> {
        let mut outcome = MultiGetOutcome::default();
        if ids.is_empty() {
            return Ok(outcome);
        }

        let keys: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();
        let hits = match self.engine.multi_get(self.alias(), &keys).await {
            Ok(hits) => hits,
            Err(EngineError::NotFound(_)) => Vec::new(),
            Err(e) => {
                error!(docs = ids.len(), error = %e, "multi get failed");
                return Err(NodestoreError::engine("multi_get", self.alias(), None, e));
            }
        };

        for hit in hits {
            let id = hit.document.id.clone();
            match self.decode_hit(&id, &hit) {
                Ok((blob, _)) => {
                    outcome.blobs.insert(id, blob);
                }
                Err(err) => outcome
                    .corrupt
                    .push(ItemFailure::new(id, Some(hit.partition), err)),
            }
        }
        Ok(outcome)
    }

    async fn lookup(&self, id: &NodeId) -> Result<Option<EngineHit>, NodestoreError> {
        match self.engine.get_by_key(self.alias(), id.as_str()).await {
            Ok(hit) => Ok(hit),
            // エイリアス未作成 = まだ 1 件も書かれていない
            Err(EngineError::NotFound(_)) => Ok(None),
            Err(e) => {
                error!(doc_id = %id, error = %e, "document lookup failed");
                Err(NodestoreError::engine("get", self.alias(), Some(id), e))
            }
        }
    }

    fn decode_hit(
        &self,
        id: &NodeId,
        hit: &EngineHit,
    ) -> Result<(Blob, Timestamp), NodestoreError> {
        self.codec.decode(&hit.document).map_err(|source| {
            warn!(doc_id = %id, partition = %hit.partition, error = %source, "corrupt document");
            NodestoreError::CorruptDocument {
                id: id.clone(),
                partition: hit.partition.clone(),
                source,
            }
        })
    }

    // ---------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------

    /// Upsert one blob; returns the partition written to.
    pub async fn set(
        &self,
        id: &NodeId,
        blob: &[u8],
        timestamp: Timestamp,
        options: SetOptions,
    ) -> Result<PartitionName, NodestoreError> {
        let partition = self.router.partition_for(timestamp);
        let document = self
            .codec
            .encode(id, blob, timestamp)
            .map_err(|source| NodestoreError::Encode {
                id: id.clone(),
                source,
            })?;

        let mut results = bulk_write_partition(
            self.engine.as_ref(),
            &partition,
            vec![document],
            self.refresh(options),
        )
        .await;
        match results.pop() {
            Some(Ok(())) => {
                debug!(doc_id = %id, partition = %partition, "document stored");
                Ok(partition)
            }
            Some(Err(err)) => {
                error!(doc_id = %id, partition = %partition, error = %err, "document set failed");
                Err(err)
            }
            None => Err(NodestoreError::engine(
                "bulk_write",
                partition.as_str(),
                Some(id),
                EngineError::Rejected("no acknowledgment for document".to_string()),
            )),
        }
    }

    /// Upsert many blobs: one bulk request per partition, partitions in parallel.
    pub async fn set_multi(&self, items: Vec<NodeWrite>, options: SetOptions) -> BatchReport {
        let mut report = BatchReport::default();
        let mut by_partition: BTreeMap<PartitionName, Vec<Document>> = BTreeMap::new();

        for item in items {
            let partition = self.router.partition_for(item.timestamp);
            match self.codec.encode(&item.id, &item.blob, item.timestamp) {
                Ok(doc) => by_partition.entry(partition).or_default().push(doc),
                Err(source) => report.failed.push(ItemFailure::new(
                    item.id.clone(),
                    Some(partition),
                    NodestoreError::Encode {
                        id: item.id,
                        source,
                    },
                )),
            }
        }

        let refresh = self.refresh(options);
        let writes = by_partition.into_iter().map(|(partition, docs)| async move {
            let ids: Vec<NodeId> = docs.iter().map(|d| d.id.clone()).collect();
            let results =
                bulk_write_partition(self.engine.as_ref(), &partition, docs, refresh).await;
            (partition, ids, results)
        });

        for (partition, ids, results) in join_all(writes).await {
            for (id, result) in ids.into_iter().zip(results) {
                match result {
                    Ok(()) => report.succeeded.push(id),
                    Err(err) => report
                        .failed
                        .push(ItemFailure::new(id, Some(partition.clone()), err)),
                }
            }
        }

        if !report.is_complete() {
            error!(
                docs = report.total(),
                failed = report.failed.len(),
                "set_multi partially failed"
            );
        }
        report
    }

    // ---------------------------------------------------------------
    // Deletes
    // ---------------------------------------------------------------

    /// Delete one node. Deleting an absent node is a no-op.
    pub async fn delete(&self, id: &NodeId, hint: Option<Timestamp>) -> Result<(), NodestoreError> {
        let result = match hint {
            Some(timestamp) => {
                let partition = self.router.partition_for(timestamp);
                self.delete_in(&partition, id).await.map(|_| ())
            }
            None => match self.config.delete_fallback {
                DeleteFallback::Resolve => self.delete_resolved(id).await,
                DeleteFallback::Query => self
                    .delete_by_query(std::slice::from_ref(id))
                    .await
                    .map(|_| ()),
                DeleteFallback::Reject => {
                    return Err(NodestoreError::DeleteRequiresTimestamp { id: id.clone() });
                }
            },
        };

        match &result {
            Ok(()) => info!(doc_id = %id, "document delete executed"),
            Err(err) => error!(doc_id = %id, error = %err, "document delete failed"),
        }
        result
    }

    pub async fn delete_multi(&self, ids: &[NodeId]) -> BatchReport {
        let items: Vec<(NodeId, Option<Timestamp>)> =
            ids.iter().map(|id| (id.clone(), None)).collect();
        self.delete_multi_hinted(&items).await
    }

    /// Delete many nodes; hinted items go straight to their partition, the
    /// rest follow the configured fallback.
    pub async fn delete_multi_hinted(
        &self,
        items: &[(NodeId, Option<Timestamp>)],
    ) -> BatchReport {
        let mut report = BatchReport::default();
        let mut by_partition: BTreeMap<PartitionName, Vec<NodeId>> = BTreeMap::new();
        let mut unhinted = Vec::new();

        for (id, hint) in items {
            match hint {
                Some(ts) => by_partition
                    .entry(self.router.partition_for(*ts))
                    .or_default()
                    .push(id.clone()),
                None => unhinted.push(id.clone()),
            }
        }

        report.merge(self.delete_grouped(by_partition).await);

        if !unhinted.is_empty() {
            let fallback = match self.config.delete_fallback {
                DeleteFallback::Resolve => self.delete_multi_resolved(unhinted).await,
                DeleteFallback::Query => self.delete_multi_by_query(unhinted).await,
                DeleteFallback::Reject => BatchReport {
                    succeeded: Vec::new(),
                    failed: unhinted
                        .into_iter()
                        .map(|id| {
                            ItemFailure::new(
                                id.clone(),
                                None,
                                NodestoreError::DeleteRequiresTimestamp { id },
                            )
                        })
                        .collect(),
                },
            };
            report.merge(fallback);
        }

        info!(
            docs_to_delete = items.len(),
            failed = report.failed.len(),
            "document delete_multi executed"
        );
        report
    }

    /// Delete in a known partition; `Ok(true)` if a document was removed.
    async fn delete_in(
        &self,
        partition: &PartitionName,
        id: &NodeId,
    ) -> Result<bool, NodestoreError> {
        let refresh = self.config.durability.refresh();
        match self.engine.delete_by_key(partition, id.as_str(), refresh).await {
            Ok(deleted) => Ok(deleted),
            // パーティションが無い / 並行削除 はどちらも「消えている」
            Err(EngineError::NotFound(_)) | Err(EngineError::Conflict(_)) => Ok(false),
            Err(e) => Err(NodestoreError::engine(
                "delete_by_key",
                partition.as_str(),
                Some(id),
                e,
            )),
        }
    }

    async fn delete_resolved(&self, id: &NodeId) -> Result<(), NodestoreError> {
        for _ in 0..MAX_RESOLVE_ROUNDS {
            let Some(hit) = self.lookup(id).await? else {
                return Ok(());
            };
            if !self.delete_in(&hit.partition, id).await? {
                return Ok(());
            }
        }
        match self.lookup(id).await? {
            None => Ok(()),
            Some(hit) => {
                warn!(
                    doc_id = %id,
                    partition = %hit.partition,
                    rounds = MAX_RESOLVE_ROUNDS,
                    "copies remain after resolve rounds"
                );
                Err(NodestoreError::DeleteIncomplete {
                    id: id.clone(),
                    partition: hit.partition,
                })
            }
        }
    }

    async fn delete_by_query(&self, ids: &[NodeId]) -> Result<u64, NodestoreError> {
        self.query_delete(ids)
            .await
            .map_err(|e| NodestoreError::engine("delete_by_query", self.alias(), ids.first(), e))
    }

    async fn query_delete(&self, ids: &[NodeId]) -> Result<u64, EngineError> {
        let keys: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();
        let refresh = self.config.durability.refresh();
        match self.engine.delete_by_query(self.alias(), &keys, refresh).await {
            Ok(deleted) => Ok(deleted),
            Err(EngineError::NotFound(_)) | Err(EngineError::Conflict(_)) => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Per-partition deletes; partitions in parallel, keys within a partition
    /// one after another. Returns the report and the ids actually removed.
    async fn delete_grouped_tracked(
        &self,
        by_partition: BTreeMap<PartitionName, Vec<NodeId>>,
    ) -> (BatchReport, Vec<NodeId>) {
        let deletes = by_partition.into_iter().map(|(partition, ids)| async move {
            let mut results = Vec::with_capacity(ids.len());
            for id in ids {
                let result = self.delete_in(&partition, &id).await;
                results.push((id, result));
            }
            (partition, results)
        });

        let mut report = BatchReport::default();
        let mut removed = Vec::new();
        for (partition, results) in join_all(deletes).await {
            for (id, result) in results {
                match result {
                    Ok(deleted) => {
                        if deleted {
                            removed.push(id.clone());
                        }
                        report.succeeded.push(id);
                    }
                    Err(err) => report
                        .failed
                        .push(ItemFailure::new(id, Some(partition.clone()), err)),
                }
            }
        }
        (report, removed)
    }

    async fn delete_grouped(
        &self,
        by_partition: BTreeMap<PartitionName, Vec<NodeId>>,
    ) -> BatchReport {
        self.delete_grouped_tracked(by_partition).await.0
    }

    async fn delete_multi_resolved(&self, ids: Vec<NodeId>) -> BatchReport {
        let mut report = BatchReport::default();
        let mut failed: HashSet<NodeId> = HashSet::new();
        let mut pending = ids.clone();

        for _ in 0..MAX_RESOLVE_ROUNDS {
            if pending.is_empty() {
                break;
            }
            let hits = match self.resolve_copies(&pending).await {
                Ok(hits) => hits,
                Err(e) => {
                    for failure in self.lookup_failures(pending.drain(..), e) {
                        failed.insert(failure.id.clone());
                        report.failed.push(failure);
                    }
                    break;
                }
            };
            if hits.is_empty() {
                pending.clear();
                break;
            }

            let mut by_partition: BTreeMap<PartitionName, Vec<NodeId>> = BTreeMap::new();
            for hit in hits {
                by_partition
                    .entry(hit.partition)
                    .or_default()
                    .push(hit.document.id);
            }
            let (round, removed) = self.delete_grouped_tracked(by_partition).await;
            for failure in round.failed {
                failed.insert(failure.id.clone());
                report.failed.push(failure);
            }
            // 消せたものだけ次のラウンドで残りのコピーを探す
            pending = removed;
        }

        // ラウンドを使い切った: まだ見えるコピーは失敗として返す
        if !pending.is_empty() {
            let remaining = match self.resolve_copies(&pending).await {
                Ok(hits) => hits,
                Err(e) => {
                    for failure in self.lookup_failures(pending.drain(..), e) {
                        failed.insert(failure.id.clone());
                        report.failed.push(failure);
                    }
                    Vec::new()
                }
            };
            for hit in remaining {
                let id = hit.document.id;
                warn!(
                    doc_id = %id,
                    partition = %hit.partition,
                    rounds = MAX_RESOLVE_ROUNDS,
                    "copies remain after resolve rounds"
                );
                failed.insert(id.clone());
                report.failed.push(ItemFailure::new(
                    id.clone(),
                    Some(hit.partition.clone()),
                    NodestoreError::DeleteIncomplete {
                        id,
                        partition: hit.partition,
                    },
                ));
            }
        }

        report.succeeded = ids.into_iter().filter(|id| !failed.contains(id)).collect();
        report
    }

    /// Newest visible copy of each id through the alias.
    async fn resolve_copies(&self, ids: &[NodeId]) -> Result<Vec<EngineHit>, EngineError> {
        let keys: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();
        match self.engine.multi_get(self.alias(), &keys).await {
            Ok(hits) => Ok(hits),
            Err(EngineError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn lookup_failures(
        &self,
        ids: impl IntoIterator<Item = NodeId>,
        e: EngineError,
    ) -> Vec<ItemFailure> {
        ids.into_iter()
            .map(|id| {
                let err = NodestoreError::engine("multi_get", self.alias(), Some(&id), e.clone());
                ItemFailure::new(id, None, err)
            })
            .collect()
    }

    async fn delete_multi_by_query(&self, ids: Vec<NodeId>) -> BatchReport {
        match self.query_delete(&ids).await {
            Ok(deleted) => {
                debug!(docs_to_delete = ids.len(), docs_deleted = deleted, "delete by query");
                BatchReport {
                    succeeded: ids,
                    failed: Vec::new(),
                }
            }
            Err(e) => BatchReport {
                succeeded: Vec::new(),
                failed: ids
                    .into_iter()
                    .map(|id| {
                        let err = NodestoreError::engine(
                            "delete_by_query",
                            self.alias(),
                            Some(&id),
                            e.clone(),
                        );
                        ItemFailure::new(id, None, err)
                    })
                    .collect(),
            },
        }
    }
}

/// One bulk request against one partition, one result per document in order.
///
/// A failed request fails every document; a response with fewer items than
/// documents leaves the unacknowledged ones failed.
pub(crate) async fn bulk_write_partition(
    engine: &dyn SearchEngine,
    partition: &PartitionName,
    documents: Vec<Document>,
    refresh: Refresh,
) -> Vec<Result<(), NodestoreError>> {
    let ids: Vec<NodeId> = documents.iter().map(|d| d.id.clone()).collect();
    match engine.bulk_write(partition, documents, refresh).await {
        Ok(items) => {
            let mut items = items.into_iter();
            ids.iter()
                .map(|id| match items.next() {
                    Some(Ok(())) => Ok(()),
                    Some(Err(e)) => Err(NodestoreError::engine(
                        "bulk_write",
                        partition.as_str(),
                        Some(id),
                        e,
                    )),
                    None => Err(NodestoreError::engine(
                        "bulk_write",
                        partition.as_str(),
                        Some(id),
                        EngineError::Rejected("no acknowledgment for document".to_string()),
                    )),
                })
                .collect()
        }
        Err(e) => ids
            .iter()
            .map(|id| {
                Err(NodestoreError::engine(
                    "bulk_write",
                    partition.as_str(),
                    Some(id),
                    e.clone(),
                ))
            })
            .collect(),
    }
}
