//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の実装を含めます。
//!
//! # 含まれる実装
//! - **InMemoryEngine**: 開発用の検索エンジン（障害注入つき）
//! - **VecRowSource**: メモリ上の移行元テーブル
//! - **InMemoryCheckpointStore / JsonFileCheckpointStore**: チェックポイント保存先
//!
//! # 本番用実装
//! 実クラスタ向けの SearchEngine（HTTP トランスポート）はホストアプリ側で提供します。

pub mod checkpoint;
pub mod inmem_engine;
pub mod inmem_rows;

// 主要な型を再エクスポート
pub use self::checkpoint::{InMemoryCheckpointStore, JsonFileCheckpointStore};
pub use self::inmem_engine::{EngineCalls, InMemoryEngine};
pub use self::inmem_rows::VecRowSource;
