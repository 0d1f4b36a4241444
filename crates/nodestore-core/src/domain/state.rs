//! State - 移行ジョブの状態
//!
//! # 状態遷移
//! - Idle -> Running
//! - Running -> Completed: 移行元カーソルを読み切った
//! - Running -> Failed: 回復不能な移行元エラー / エンジン全断
//! - Running -> Paused: オペレータによるキャンセル（処理中のバッチは完了させる）

use serde::{Deserialize, Serialize};

/// MigrationState は BulkMigrator の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    Idle,
    Running,
    Completed,
    Failed,
    Paused,
}

impl MigrationState {
    /// Is this a terminal state for the current run?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MigrationState::Completed | MigrationState::Failed | MigrationState::Paused
        )
    }

    /// Can a later run pick up from the saved checkpoint?
    pub fn is_resumable(self) -> bool {
        matches!(self, MigrationState::Failed | MigrationState::Paused)
    }

    /// Allowed transitions of the state machine.
    pub fn can_transition_to(self, next: MigrationState) -> bool {
        matches!(
            (self, next),
            (MigrationState::Idle, MigrationState::Running)
                | (MigrationState::Running, MigrationState::Completed)
                | (MigrationState::Running, MigrationState::Failed)
                | (MigrationState::Running, MigrationState::Paused)
        )
    }
}
