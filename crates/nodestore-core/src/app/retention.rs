//! Retention Manager - 日次パーティション単位の保持期限処理
//!
//! ドキュメント単位の削除はせず、期限切れのパーティションを丸ごと落とします。
//!
//! # 判定
//! - パーティション名 `<base>-YYYY-MM-DD[-suffix]` の日付が cutoff の日付より
//!   **厳密に前** のものだけが対象（cutoff 当日は残す）
//! - 名前が解釈できないものは触らずに skipped として報告
//!
//! # 並行性
//! - 対象パーティションの drop は並行に発行し、失敗はパーティションごとに報告
//! - 1 つの失敗で他の drop を止めない

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use futures::future::join_all;
use tracing::{error, info, warn};

use crate::domain::{CleanupReport, NodestoreError, PartitionName};
use crate::ports::{Clock, EngineError, SearchEngine, SystemClock};
use crate::routing::PartitionRouter;

/// Drops expired daily partitions.
pub struct RetentionManager {
    engine: Arc<dyn SearchEngine>,
    router: PartitionRouter,
    clock: Arc<dyn Clock>,
}

/// Partitions listed for one cutoff, before anything is dropped.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RetentionPlan {
    pub expired: Vec<PartitionName>,
    pub skipped: Vec<PartitionName>,
    pub retained: usize,
}

impl RetentionManager {
    pub fn new(engine: Arc<dyn SearchEngine>, router: PartitionRouter) -> Self {
        Self {
            engine,
            router,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Which partitions `cleanup_before(cutoff)` would drop.
    pub async fn plan(&self, cutoff: DateTime<Utc>) -> Result<RetentionPlan, NodestoreError> {
        let base = self.router.base_name();
        let partitions = self
            .engine
            .list_partitions(base)
            .await
            .map_err(|e| NodestoreError::engine("list_partitions", base, None, e))?;
        Ok(self.classify(partitions, cutoff.date_naive()))
    }

    fn classify(&self, partitions: Vec<PartitionName>, cutoff: NaiveDate) -> RetentionPlan {
        let mut plan = RetentionPlan::default();
        for partition in partitions {
            match self.router.date_of(&partition) {
                Some(date) if date < cutoff => plan.expired.push(partition),
                Some(_) => plan.retained += 1,
                None => {
                    warn!(partition = %partition, "partition name not recognised, skipped");
                    plan.skipped.push(partition);
                }
            }
        }
        plan
    }

    /// Drop every partition dated strictly before the cutoff's UTC date.
    ///
    /// Fails only if the partitions cannot be listed; individual drop
    /// failures land in [`CleanupReport::failed`].
    pub async fn cleanup_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<CleanupReport, NodestoreError> {
        let plan = self.plan(cutoff).await?;

        let drops = plan.expired.into_iter().map(|partition| async move {
            let result = self.engine.drop_partition(&partition).await;
            (partition, result)
        });

        let mut report = CleanupReport {
            skipped: plan.skipped,
            retained: plan.retained,
            ..CleanupReport::default()
        };
        for (partition, result) in join_all(drops).await {
            match result {
                // 並行する cleanup が先に消した
                Ok(()) | Err(EngineError::NotFound(_)) => {
                    info!(partition = %partition, "partition dropped");
                    report.dropped.push(partition);
                }
                Err(source) => {
                    error!(partition = %partition, error = %source, "failed to drop partition");
                    report
                        .failed
                        .push(NodestoreError::PartitionDropFailure { partition, source });
                }
            }
        }

        info!(
            cutoff = %cutoff.date_naive(),
            deleted = report.dropped.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            total = report.total_checked(),
            "cleanup completed"
        );
        Ok(report)
    }

    /// `cleanup_before(now - max_age)`.
    ///
    /// A `max_age` reaching past the representable range clamps the cutoff to
    /// the earliest instant, which drops nothing.
    pub async fn cleanup_older_than(
        &self,
        max_age: Duration,
    ) -> Result<CleanupReport, NodestoreError> {
        let now = self.clock.now();
        let cutoff = now.checked_sub_signed(max_age).unwrap_or_else(|| {
            warn!(now = %now, max_age = %max_age, "max age out of range, cutoff clamped");
            DateTime::<Utc>::MIN_UTC
        });
        self.cleanup_before(cutoff).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::InMemoryEngine;
    use crate::ports::FixedClock;
    use chrono::TimeZone;

    fn setup(partitions: &[&str]) -> (Arc<InMemoryEngine>, RetentionManager) {
        let engine = Arc::new(InMemoryEngine::new());
        for p in partitions {
            engine.create_partition(p);
        }
        let manager = RetentionManager::new(engine.clone(), PartitionRouter::new("nodestore"));
        (engine, manager)
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn drops_only_strictly_older_partitions() {
        let (engine, manager) = setup(&[
            "nodestore-2024-01-01",
            "nodestore-2024-01-02",
            "nodestore-2024-01-03",
        ]);

        let report = manager.cleanup_before(at(2024, 1, 2, 18)).await.unwrap();

        assert_eq!(report.dropped, vec![PartitionName::from_raw("nodestore-2024-01-01")]);
        assert_eq!(report.retained, 2);
        assert!(report.failed.is_empty());
        assert_eq!(
            engine.partitions(),
            vec!["nodestore-2024-01-02", "nodestore-2024-01-03"]
        );
    }

    #[tokio::test]
    async fn suffixed_and_foreign_names() {
        let (engine, manager) = setup(&[
            "nodestore-2023-12-31-reindexed",
            "nodestore-latest",
            "nodestore-2024-13-01",
        ]);

        let report = manager.cleanup_before(at(2024, 1, 1, 0)).await.unwrap();
        assert_eq!(report.dropped.len(), 1);
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(report.total_checked(), 3);
        assert_eq!(engine.partitions().len(), 2);
    }

    #[tokio::test]
    async fn drop_failure_is_isolated() {
        let (engine, manager) = setup(&[
            "nodestore-2024-01-01",
            "nodestore-2024-01-02",
            "nodestore-2024-01-03",
        ]);
        engine.fail_drop_for("nodestore-2024-01-01");

        let report = manager.cleanup_before(at(2024, 1, 3, 0)).await.unwrap();
        assert_eq!(report.dropped, vec![PartitionName::from_raw("nodestore-2024-01-02")]);
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(
            &report.failed[0],
            NodestoreError::PartitionDropFailure { partition, .. }
                if partition.as_str() == "nodestore-2024-01-01"
        ));
        assert!(engine.partitions().contains(&"nodestore-2024-01-01".to_string()));
    }

    #[tokio::test]
    async fn listing_failure_is_an_error() {
        let (engine, manager) = setup(&["nodestore-2024-01-01"]);
        engine.set_unavailable(true);
        assert!(manager.cleanup_before(at(2024, 6, 1, 0)).await.is_err());
    }

    #[tokio::test]
    async fn cleanup_is_idempotent() {
        let (engine, manager) = setup(&["nodestore-2024-01-01"]);
        manager.cleanup_before(at(2024, 2, 1, 0)).await.unwrap();
        let again = manager.cleanup_before(at(2024, 2, 1, 0)).await.unwrap();
        assert!(again.dropped.is_empty());
        assert_eq!(engine.calls().drops, 1);
    }

    #[tokio::test]
    async fn older_than_uses_clock() {
        let (engine, manager) = setup(&["nodestore-2024-01-01", "nodestore-2024-01-10"]);
        let manager = manager.with_clock(Arc::new(FixedClock::new(at(2024, 1, 15, 9))));

        let report = manager.cleanup_older_than(Duration::days(7)).await.unwrap();
        assert_eq!(report.dropped.len(), 1);
        assert_eq!(engine.partitions(), vec!["nodestore-2024-01-10"]);
    }

    #[tokio::test]
    async fn older_than_beyond_calendar_drops_nothing() {
        let (engine, manager) = setup(&["nodestore-0001-01-01", "nodestore-2024-01-10"]);
        let manager = manager.with_clock(Arc::new(FixedClock::new(at(2024, 1, 15, 9))));

        let report = manager
            .cleanup_older_than(Duration::days(365 * 300_000))
            .await
            .unwrap();
        assert!(report.dropped.is_empty());
        assert_eq!(report.retained, 2);
        assert_eq!(engine.partitions().len(), 2);
    }

    #[tokio::test]
    async fn plan_does_not_drop() {
        let (engine, manager) = setup(&["nodestore-2024-01-01", "nodestore-2024-03-01"]);
        let plan = manager.plan(at(2024, 2, 1, 0)).await.unwrap();
        assert_eq!(plan.expired.len(), 1);
        assert_eq!(plan.retained, 1);
        assert_eq!(engine.calls().drops, 0);
    }
}
