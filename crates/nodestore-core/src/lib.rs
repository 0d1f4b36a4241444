//! nodestore-core
//!
//! Node blob store backed by daily partitions of a search engine.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, partition, document, checkpoint, outcome, state, errors）
//! - **routing**: タイムスタンプ → `<base>-YYYY-MM-DD` のパーティションルーター
//! - **codec**: Blob ↔ ドキュメントの変換とパーティションテンプレート
//! - **ports**: 抽象化レイヤー（SearchEngine, RowSource, CheckpointStore, Clock）
//! - **app**: アプリケーションロジック（NodeStore, RetentionManager, BulkMigrator, AppBuilder）
//! - **config**: 設定（JSON / ホスト形式の文字列マップ）
//! - **observability**: 移行の進捗カウンタ
//! - **impls**: 実装（InMemoryEngine など開発用）

pub mod app;
pub mod codec;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod routing;

pub use app::{App, AppBuilder, BulkMigrator, NodeStore, RetentionManager};
pub use config::{DeleteFallback, Durability, NodestoreConfig};
pub use domain::{NodeId, NodestoreError};
