//! VecRowSource - メモリ上の移行元テーブル
//!
//! 行は (timestamp, id) 順に並べ替えて保持し、RowSource のカーソル契約
//! （`after` より後ろだけを昇順で返す）をそのまま満たします。
//! テスト用に「N 回目の fetch から接続断」を注入できます。

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::domain::RowKey;
use crate::ports::{RowSource, SourceError, SourceRow};

#[derive(Debug, Default)]
pub struct VecRowSource {
    rows: Vec<SourceRow>,
    fetches: AtomicUsize,
    fail_from_fetch: Mutex<Option<usize>>,
}

impl VecRowSource {
    pub fn new(mut rows: Vec<SourceRow>) -> Self {
        rows.sort_by_key(SourceRow::key);
        Self {
            rows,
            fetches: AtomicUsize::new(0),
            fail_from_fetch: Mutex::new(None),
        }
    }

    /// Every fetch from the `n`-th (0-based) on fails with a lost connection.
    pub fn fail_from_fetch(&self, n: usize) {
        *self
            .fail_from_fetch
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(n);
    }

    pub fn heal(&self) {
        *self
            .fail_from_fetch
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = None;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    pub fn rows(&self) -> &[SourceRow] {
        &self.rows
    }

    fn start_index(&self, after: Option<&RowKey>) -> usize {
        match after {
            Some(key) => self.rows.partition_point(|row| row.key() <= *key),
            None => 0,
        }
    }
}

#[async_trait]
impl RowSource for VecRowSource {
    async fn fetch_batch(
        &self,
        after: Option<&RowKey>,
        limit: usize,
    ) -> Result<Vec<SourceRow>, SourceError> {
        let fetch_no = self.fetches.fetch_add(1, Ordering::Relaxed);
        let fail_from = *self
            .fail_from_fetch
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if fail_from.is_some_and(|n| fetch_no >= n) {
            return Err(SourceError::ConnectionLost(format!(
                "connection reset during fetch #{fetch_no}"
            )));
        }

        let start = self.start_index(after);
        Ok(self.rows.iter().skip(start).take(limit).cloned().collect())
    }

    async fn estimate_rows(&self, after: Option<&RowKey>) -> Result<u64, SourceError> {
        Ok((self.rows.len() - self.start_index(after)) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NodeId;
    use chrono::{TimeZone, Utc};

    fn row(id: &str, secs: i64) -> SourceRow {
        SourceRow::new(
            NodeId::new(id).unwrap(),
            id.as_bytes().to_vec(),
            Utc.timestamp_opt(secs, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn pages_in_time_order() {
        let source = VecRowSource::new(vec![row("c", 3), row("a", 1), row("b", 2)]);

        let first = source.fetch_batch(None, 2).await.unwrap();
        assert_eq!(
            first.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );

        let last_key = first.last().unwrap().key();
        let second = source.fetch_batch(Some(&last_key), 2).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id.as_str(), "c");

        let done = source.fetch_batch(Some(&second[0].key()), 2).await.unwrap();
        assert!(done.is_empty());
    }

    #[tokio::test]
    async fn ties_on_timestamp_break_by_id() {
        let source = VecRowSource::new(vec![row("b", 1), row("a", 1)]);
        let first = source.fetch_batch(None, 1).await.unwrap();
        assert_eq!(first[0].id.as_str(), "a");
        let second = source.fetch_batch(Some(&first[0].key()), 1).await.unwrap();
        assert_eq!(second[0].id.as_str(), "b");
    }

    #[tokio::test]
    async fn estimate_counts_rows_after_cursor() {
        let source = VecRowSource::new(vec![row("a", 1), row("b", 2), row("c", 3)]);
        assert_eq!(source.estimate_rows(None).await.unwrap(), 3);
        assert_eq!(source.estimate_rows(Some(&row("a", 1).key())).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn injected_connection_loss() {
        let source = VecRowSource::new(vec![row("a", 1)]);
        source.fail_from_fetch(1);
        assert!(source.fetch_batch(None, 10).await.is_ok());
        assert!(matches!(
            source.fetch_batch(None, 10).await,
            Err(SourceError::ConnectionLost(_))
        ));
        source.heal();
        assert!(source.fetch_batch(None, 10).await.is_ok());
        assert_eq!(source.fetch_count(), 3);
    }
}
