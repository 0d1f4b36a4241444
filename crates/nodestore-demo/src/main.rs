use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use nodestore_core::app::{AppBuilder, SetOptions};
use nodestore_core::domain::{NodeId, RowKey};
use nodestore_core::impls::InMemoryEngine;
use nodestore_core::ports::{RowSource, SourceError, SourceRow};
use nodestore_core::NodestoreConfig;

const CONFIG: &str = r#"{
    "durability": "sync",
    "batch_size": 2,
    "partition_base_name": "nodestore"
}"#;

const LEGACY_ROWS: &str = r#"[
    { "id": "a1b2", "data": "first event",  "timestamp": "2024-01-01T08:00:00Z" },
    { "id": "c3d4", "data": "second event", "timestamp": "2024-01-02T09:30:00Z" },
    { "id": "e5f6", "data": "third event",  "timestamp": "2024-01-02T23:59:59Z" },
    { "id": "g7h8", "data": "fourth event", "timestamp": "2024-01-03T00:00:00Z" }
]"#;

#[derive(Debug, Deserialize)]
struct LegacyRow {
    id: String,
    data: String,
    timestamp: DateTime<Utc>,
}

/// 旧ストアのテーブル（ここでは JSON フィクスチャ）
struct LegacyTable {
    rows: Vec<SourceRow>,
}

impl LegacyTable {
    fn from_json(json: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let parsed: Vec<LegacyRow> = serde_json::from_str(json)?;
        let mut rows = Vec::with_capacity(parsed.len());
        for row in parsed {
            rows.push(SourceRow::new(
                NodeId::new(row.id)?,
                row.data.into_bytes(),
                row.timestamp,
            ));
        }
        rows.sort_by_key(SourceRow::key);
        Ok(Self { rows })
    }
}

#[async_trait]
impl RowSource for LegacyTable {
    async fn fetch_batch(
        &self,
        after: Option<&RowKey>,
        limit: usize,
    ) -> Result<Vec<SourceRow>, SourceError> {
        Ok(self
            .rows
            .iter()
            .filter(|row| after.is_none_or(|key| row.key() > *key))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn estimate_rows(&self, after: Option<&RowKey>) -> Result<u64, SourceError> {
        Ok(self
            .rows
            .iter()
            .filter(|row| after.is_none_or(|key| row.key() > *key))
            .count() as u64)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // (A) エンジンと設定から App を組み立てる
    let config = NodestoreConfig::from_json_str(CONFIG)?;
    let engine = Arc::new(InMemoryEngine::new());
    let app = AppBuilder::new()
        .engine(engine.clone())
        .config(config)
        .build()
        .await?;
    engine.put_template(app.template());

    // (B) 旧テーブルから移行
    let source = Arc::new(LegacyTable::from_json(LEGACY_ROWS)?);
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let mut migrator = app.migrator(source)?;
    let report = migrator.run(None, cancel_rx).await;
    info!(
        state = ?report.state,
        resumable = report.is_resumable(),
        migrated = report.checkpoint.migrated_rows,
        partitions = ?report.progress.partitions_touched,
        "migration done"
    );

    // (C) 読み書き
    let id = NodeId::new("c3d4")?;
    let blob = app.store.get(&id).await?;
    info!(doc_id = %id, payload = %String::from_utf8_lossy(&blob), "read back");

    let fresh = NodeId::new("z9y8")?;
    app.store
        .set(&fresh, b"written after migration", Utc::now(), SetOptions::default())
        .await?;
    app.store.delete(&NodeId::new("a1b2")?, None).await?;

    // (D) 7 日より古いパーティションを落とす
    let cleanup = app.retention.cleanup_older_than(Duration::days(7)).await?;
    info!(
        dropped = cleanup.dropped.len(),
        retained = cleanup.retained,
        remaining = ?engine.partitions(),
        "cleanup done"
    );

    Ok(())
}
