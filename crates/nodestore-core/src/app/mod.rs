//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: 構築とワイヤリング（起動時検証）
//! - **NodeStore**: Storage Gateway（get / set / delete と multi 版）
//! - **RetentionManager**: 日次パーティションの保持期限処理
//! - **BulkMigrator**: 旧ストアからの一括移行（チェックポイントで再開可能）

pub mod builder;
pub mod gateway;
pub mod migrator;
pub mod retention;

// 主要な型を再エクスポート
pub use self::builder::{App, AppBuilder, BuildError};
pub use self::gateway::{NodeStore, NodeWrite, SetOptions};
pub use self::migrator::{BulkMigrator, MigrationReport};
pub use self::retention::{RetentionManager, RetentionPlan};
