//! InMemoryEngine - 開発・テスト用の検索エンジン
//!
//! # 学習ポイント
//! - テンプレートによるエイリアス付与（パーティション作成時に自動で参加）
//! - 障害注入（全断・キー単位の失敗・パーティション単位の失敗）
//! - 呼び出し記録（refresh 指定や delete_by_query の回数をテストで検証する）
//!
//! # 実装詳細
//! - BTreeMap<パーティション名, HashMap<キー, Document>> で保持
//! - std::sync::Mutex で排他制御（ロックを持ったまま await しない）

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::codec::PartitionTemplate;
use crate::domain::{Document, EngineHit, PartitionName};
use crate::ports::{BulkItemResult, EngineError, Refresh, SearchEngine};

#[derive(Debug, Default)]
struct Faults {
    unavailable: bool,
    failing_keys: HashSet<String>,
    failing_bulk_partitions: HashSet<String>,
    failing_drops: HashSet<String>,
}

/// Calls observed by the engine, for assertions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineCalls {
    /// (partition, document count, refresh) per bulk request.
    pub bulk_writes: Vec<(String, usize, Refresh)>,
    pub deletes_by_key: usize,
    pub deletes_by_query: usize,
    pub drops: usize,
}

#[derive(Debug, Default)]
struct EngineState {
    partitions: BTreeMap<String, HashMap<String, Document>>,
    aliases: BTreeMap<String, BTreeSet<String>>,
    templates: Vec<PartitionTemplate>,
    faults: Faults,
    calls: EngineCalls,
}

impl EngineState {
    fn check_available(&self) -> Result<(), EngineError> {
        if self.faults.unavailable {
            return Err(EngineError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }

    /// Partitions behind `target`, newest first for aliases.
    fn resolve(&self, target: &str) -> Result<Vec<String>, EngineError> {
        if let Some(members) = self.aliases.get(target) {
            return Ok(members.iter().rev().cloned().collect());
        }
        if self.partitions.contains_key(target) {
            return Ok(vec![target.to_string()]);
        }
        Err(EngineError::NotFound(target.to_string()))
    }

    fn ensure_partition(&mut self, name: &str) -> &mut HashMap<String, Document> {
        if !self.partitions.contains_key(name) {
            for template in &self.templates {
                if template.matches(name) {
                    self.aliases
                        .entry(template.alias.clone())
                        .or_default()
                        .insert(name.to_string());
                }
            }
        }
        self.partitions.entry(name.to_string()).or_default()
    }

    fn find(&self, target: &str, key: &str) -> Result<Option<EngineHit>, EngineError> {
        for partition in self.resolve(target)? {
            if let Some(doc) = self.partitions.get(&partition).and_then(|docs| docs.get(key)) {
                return Ok(Some(EngineHit {
                    partition: PartitionName::from_raw(partition),
                    document: doc.clone(),
                }));
            }
        }
        Ok(None)
    }
}

/// InMemoryEngine は開発用の検索エンジン
///
/// # 使用例
/// ```ignore
/// let engine = InMemoryEngine::with_template(PartitionTemplate::new("nodestore", "nodestore"));
/// engine.fail_key("node-3");
/// ```
#[derive(Debug, Default)]
pub struct InMemoryEngine {
    state: Mutex<EngineState>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine with a template registered, so new partitions join its alias.
    pub fn with_template(template: PartitionTemplate) -> Self {
        let engine = Self::new();
        engine.put_template(template);
        engine
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn put_template(&self, template: PartitionTemplate) {
        let mut state = self.lock();
        state.aliases.entry(template.alias.clone()).or_default();
        state.templates.push(template);
    }

    /// Create an empty partition (as if created out of band).
    pub fn create_partition(&self, name: &str) {
        self.lock().ensure_partition(name);
    }

    /// Store a document bypassing the codec (e.g. to plant corrupt data).
    pub fn insert_raw(&self, partition: &str, document: Document) {
        let mut state = self.lock();
        let key = document.id.as_str().to_string();
        state.ensure_partition(partition).insert(key, document);
    }

    pub fn partitions(&self) -> Vec<String> {
        self.lock().partitions.keys().cloned().collect()
    }

    pub fn document_count(&self, partition: &str) -> usize {
        self.lock().partitions.get(partition).map_or(0, HashMap::len)
    }

    pub fn total_documents(&self) -> usize {
        self.lock().partitions.values().map(HashMap::len).sum()
    }

    pub fn contains(&self, partition: &str, key: &str) -> bool {
        self.lock()
            .partitions
            .get(partition)
            .is_some_and(|docs| docs.contains_key(key))
    }

    pub fn calls(&self) -> EngineCalls {
        self.lock().calls.clone()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().faults.unavailable = unavailable;
    }

    /// Bulk items with this key fail until faults are cleared.
    pub fn fail_key(&self, key: &str) {
        self.lock().faults.failing_keys.insert(key.to_string());
    }

    /// Whole bulk requests to this partition fail.
    pub fn fail_bulk_for(&self, partition: &str) {
        self.lock()
            .faults
            .failing_bulk_partitions
            .insert(partition.to_string());
    }

    pub fn fail_drop_for(&self, partition: &str) {
        self.lock().faults.failing_drops.insert(partition.to_string());
    }

    pub fn clear_faults(&self) {
        self.lock().faults = Faults::default();
    }
}

#[async_trait]
impl SearchEngine for InMemoryEngine {
    async fn get_by_key(&self, target: &str, key: &str) -> Result<Option<EngineHit>, EngineError> {
        let state = self.lock();
        state.check_available()?;
        state.find(target, key)
    }

    async fn multi_get(
        &self,
        target: &str,
        keys: &[String],
    ) -> Result<Vec<EngineHit>, EngineError> {
        let state = self.lock();
        state.check_available()?;
        let mut hits = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(hit) = state.find(target, key)? {
                hits.push(hit);
            }
        }
        Ok(hits)
    }

    async fn bulk_write(
        &self,
        partition: &PartitionName,
        documents: Vec<Document>,
        refresh: Refresh,
    ) -> Result<Vec<BulkItemResult>, EngineError> {
        let mut state = self.lock();
        state.check_available()?;
        state
            .calls
            .bulk_writes
            .push((partition.to_string(), documents.len(), refresh));
        if state.faults.failing_bulk_partitions.contains(partition.as_str()) {
            return Err(EngineError::Unavailable(format!(
                "bulk request to {partition} rejected"
            )));
        }

        let failing_keys = state.faults.failing_keys.clone();
        let docs = state.ensure_partition(partition.as_str());
        let results = documents
            .into_iter()
            .map(|doc| {
                let key = doc.id.as_str().to_string();
                if failing_keys.contains(&key) {
                    return Err(EngineError::Timeout(format!("indexing {key} timed out")));
                }
                docs.insert(key, doc);
                Ok(())
            })
            .collect();
        Ok(results)
    }

    async fn delete_by_key(
        &self,
        partition: &PartitionName,
        key: &str,
        _refresh: Refresh,
    ) -> Result<bool, EngineError> {
        let mut state = self.lock();
        state.check_available()?;
        state.calls.deletes_by_key += 1;
        let docs = state
            .partitions
            .get_mut(partition.as_str())
            .ok_or_else(|| EngineError::NotFound(partition.to_string()))?;
        Ok(docs.remove(key).is_some())
    }

    async fn delete_by_query(
        &self,
        target: &str,
        keys: &[String],
        _refresh: Refresh,
    ) -> Result<u64, EngineError> {
        let mut state = self.lock();
        state.check_available()?;
        state.calls.deletes_by_query += 1;
        let mut deleted = 0;
        for partition in state.resolve(target)? {
            if let Some(docs) = state.partitions.get_mut(&partition) {
                for key in keys {
                    if docs.remove(key).is_some() {
                        deleted += 1;
                    }
                }
            }
        }
        Ok(deleted)
    }

    async fn list_partitions(&self, base_name: &str) -> Result<Vec<PartitionName>, EngineError> {
        let state = self.lock();
        state.check_available()?;
        let prefix = format!("{base_name}-");
        Ok(state
            .partitions
            .keys()
            .filter(|name| name.starts_with(&prefix))
            .map(|name| PartitionName::from_raw(name.clone()))
            .collect())
    }

    async fn drop_partition(&self, partition: &PartitionName) -> Result<(), EngineError> {
        let mut state = self.lock();
        state.check_available()?;
        state.calls.drops += 1;
        if state.faults.failing_drops.contains(partition.as_str()) {
            return Err(EngineError::Timeout(format!("dropping {partition} timed out")));
        }
        if state.partitions.remove(partition.as_str()).is_none() {
            return Err(EngineError::NotFound(partition.to_string()));
        }
        for members in state.aliases.values_mut() {
            members.remove(partition.as_str());
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), EngineError> {
        self.lock().check_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NodeId;
    use serde_json::json;

    fn doc(id: &str, value: u32) -> Document {
        Document::new(NodeId::new(id).unwrap(), json!({ "v": value }))
    }

    fn engine() -> InMemoryEngine {
        InMemoryEngine::with_template(PartitionTemplate::new("ns", "ns"))
    }

    fn p(name: &str) -> PartitionName {
        PartitionName::from_raw(name)
    }

    #[tokio::test]
    async fn bulk_write_creates_partition_and_joins_alias() {
        let engine = engine();
        let results = engine
            .bulk_write(&p("ns-2024-01-01"), vec![doc("a", 1)], Refresh::None)
            .await
            .unwrap();
        assert_eq!(results, vec![Ok(())]);

        let hit = engine.get_by_key("ns", "a").await.unwrap().unwrap();
        assert_eq!(hit.partition, p("ns-2024-01-01"));
        assert_eq!(hit.document.source["v"], 1);
    }

    #[tokio::test]
    async fn alias_reads_prefer_newest_partition() {
        let engine = engine();
        engine.insert_raw("ns-2024-01-01", doc("a", 1));
        engine.insert_raw("ns-2024-01-02", doc("a", 2));

        let hit = engine.get_by_key("ns", "a").await.unwrap().unwrap();
        assert_eq!(hit.partition, p("ns-2024-01-02"));
    }

    #[tokio::test]
    async fn unknown_target_is_not_found() {
        let engine = engine();
        let err = engine.get_by_key("nope", "a").await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));

        // 空のエイリアスは「見つからない」ではなく「ヒットなし」
        assert!(engine.get_by_key("ns", "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn injected_key_failures_are_per_item() {
        let engine = engine();
        engine.fail_key("b");
        let results = engine
            .bulk_write(
                &p("ns-2024-01-01"),
                vec![doc("a", 1), doc("b", 2)],
                Refresh::WaitFor,
            )
            .await
            .unwrap();
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(EngineError::Timeout(_))));
        assert!(engine.contains("ns-2024-01-01", "a"));
        assert!(!engine.contains("ns-2024-01-01", "b"));
        assert_eq!(
            engine.calls().bulk_writes,
            vec![("ns-2024-01-01".to_string(), 2, Refresh::WaitFor)]
        );
    }

    #[tokio::test]
    async fn drop_detaches_from_alias() {
        let engine = engine();
        engine.insert_raw("ns-2024-01-01", doc("a", 1));
        engine.drop_partition(&p("ns-2024-01-01")).await.unwrap();

        assert!(engine.get_by_key("ns", "a").await.unwrap().is_none());
        assert!(matches!(
            engine.drop_partition(&p("ns-2024-01-01")).await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_by_query_spans_partitions() {
        let engine = engine();
        engine.insert_raw("ns-2024-01-01", doc("a", 1));
        engine.insert_raw("ns-2024-01-02", doc("a", 2));
        engine.insert_raw("ns-2024-01-02", doc("b", 3));

        let deleted = engine
            .delete_by_query("ns", &["a".to_string()], Refresh::None)
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(engine.total_documents(), 1);
        assert_eq!(engine.calls().deletes_by_query, 1);
    }

    #[tokio::test]
    async fn list_partitions_filters_by_base() {
        let engine = engine();
        engine.create_partition("ns-2024-01-01");
        engine.create_partition("other-2024-01-01");
        let listed = engine.list_partitions("ns").await.unwrap();
        assert_eq!(listed, vec![p("ns-2024-01-01")]);
    }

    #[tokio::test]
    async fn unavailable_engine_fails_every_call() {
        let engine = engine();
        engine.set_unavailable(true);
        assert!(engine.ping().await.is_err());
        assert!(engine.get_by_key("ns", "a").await.is_err());
        assert!(engine.list_partitions("ns").await.is_err());

        engine.clear_faults();
        assert!(engine.ping().await.is_ok());
    }
}
