//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（検索エンジン、移行元 DB、チェックポイント保存先）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - 検索エンジンが source of truth（正本）
//! - ゲートウェイ・リテンションは状態を持たないルーター
//! - 移行処理だけが実行中にチェックポイントを所有する

pub mod checkpoint_store;
pub mod clock;
pub mod engine;
pub mod row_source;

// 主要な trait を再エクスポート
pub use self::checkpoint_store::{CheckpointError, CheckpointStore};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::engine::{BulkItemResult, EngineError, Refresh, SearchEngine};
pub use self::row_source::{RowSource, SourceError, SourceRow};
