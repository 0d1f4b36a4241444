//! AppBuilder - ノードストアの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 開発体験の改善（明確なエラーメッセージ）

use std::sync::Arc;

use tracing::info;

use crate::app::gateway::NodeStore;
use crate::app::migrator::BulkMigrator;
use crate::app::retention::RetentionManager;
use crate::codec::PartitionTemplate;
use crate::config::NodestoreConfig;
use crate::domain::NodestoreError;
use crate::ports::{Clock, RowSource, SearchEngine, SystemClock};
use crate::routing::PartitionRouter;

/// AppBuilder はゲートウェイ・リテンション・移行を同じ設定で組み立てる
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new()
///     .engine(engine)
///     .config(NodestoreConfig::from_json_str(json)?)
///     .build()
///     .await?;
/// ```
///
/// # Fail-fast 設計
/// - build() 時に設定を検証
/// - `validate_engine` が有効なら ping で疎通を確認
/// - 問題があれば BuildError を返す
pub struct AppBuilder {
    engine: Option<Arc<dyn SearchEngine>>,
    config: NodestoreConfig,
    clock: Arc<dyn Clock>,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("No search engine configured. Call .engine(...) before build().")]
    MissingEngine,

    #[error("Invalid nodestore configuration: {0}")]
    InvalidConfig(#[source] NodestoreError),

    #[error("Search engine is not reachable: {0}")]
    EngineUnreachable(#[source] NodestoreError),
}

impl AppBuilder {
    /// 新しい AppBuilder を作成
    pub fn new() -> Self {
        Self {
            engine: None,
            config: NodestoreConfig::default(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn engine(mut self, engine: Arc<dyn SearchEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn config(mut self, config: NodestoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Clock used by retention and migration (tests pin it).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// AppBuilder を検証して App を生成
    ///
    /// # 検証
    /// - エンジン未設定 → BuildError::MissingEngine
    /// - 設定の不備 → BuildError::InvalidConfig
    /// - `validate_engine` 有効時に ping 失敗 → BuildError::EngineUnreachable
    pub async fn build(self) -> Result<App, BuildError> {
        let engine = self.engine.ok_or(BuildError::MissingEngine)?;
        self.config.validate().map_err(BuildError::InvalidConfig)?;

        let store =
            NodeStore::new(engine.clone(), self.config.clone()).map_err(BuildError::InvalidConfig)?;
        if self.config.validate_engine {
            store.ping().await.map_err(BuildError::EngineUnreachable)?;
        }

        let retention = RetentionManager::new(
            engine.clone(),
            PartitionRouter::new(self.config.partition_base_name.clone()),
        )
        .with_clock(self.clock.clone());

        info!(
            base_name = %self.config.partition_base_name,
            alias = %self.config.alias(),
            durability = ?self.config.durability,
            "nodestore ready"
        );
        Ok(App {
            store,
            retention,
            engine,
            config: self.config,
            clock: self.clock,
        })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// App は組み立て済みのノードストア一式
pub struct App {
    pub store: NodeStore,
    pub retention: RetentionManager,
    engine: Arc<dyn SearchEngine>,
    config: NodestoreConfig,
    clock: Arc<dyn Clock>,
}

impl App {
    pub fn config(&self) -> &NodestoreConfig {
        &self.config
    }

    /// Template the engine needs so new partitions join the alias.
    pub fn template(&self) -> PartitionTemplate {
        PartitionTemplate::new(self.config.partition_base_name.clone(), self.config.alias())
    }

    /// Migrator sharing this app's engine, config and clock.
    pub fn migrator(&self, source: Arc<dyn RowSource>) -> Result<BulkMigrator, NodestoreError> {
        let migrator = BulkMigrator::new(source, self.engine.clone(), &self.config)?;
        Ok(migrator.with_clock(self.clock.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{InMemoryEngine, VecRowSource};

    #[tokio::test]
    async fn test_build_success() {
        let app = AppBuilder::new()
            .engine(Arc::new(InMemoryEngine::new()))
            .build()
            .await;
        assert!(app.is_ok());
    }

    #[tokio::test]
    async fn test_build_missing_engine() {
        let app = AppBuilder::new().build().await;
        assert!(matches!(app, Err(BuildError::MissingEngine)));
    }

    #[tokio::test]
    async fn test_build_invalid_config() {
        let app = AppBuilder::new()
            .engine(Arc::new(InMemoryEngine::new()))
            .config(NodestoreConfig {
                batch_size: 0,
                ..NodestoreConfig::default()
            })
            .build()
            .await;
        assert!(matches!(app, Err(BuildError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_build_validates_engine_when_asked() {
        let engine = Arc::new(InMemoryEngine::new());
        engine.set_unavailable(true);

        let config = NodestoreConfig {
            validate_engine: true,
            ..NodestoreConfig::default()
        };
        let app = AppBuilder::new()
            .engine(engine.clone())
            .config(config)
            .build()
            .await;
        assert!(matches!(app, Err(BuildError::EngineUnreachable(_))));

        // 検証しない設定なら起動はできる
        let app = AppBuilder::new().engine(engine).build().await;
        assert!(app.is_ok());
    }

    #[tokio::test]
    async fn test_app_wires_migrator() {
        let app = AppBuilder::new()
            .engine(Arc::new(InMemoryEngine::new()))
            .build()
            .await
            .unwrap();
        let migrator = app.migrator(Arc::new(VecRowSource::new(vec![]))).unwrap();
        assert_eq!(migrator.state(), crate::domain::MigrationState::Idle);
        assert_eq!(app.template().alias, "nodestore");
    }
}
