//! Partition routing: timestamp -> daily partition name, and back.
//!
//! `<base>-YYYY-MM-DD`, where the date is the UTC calendar day of the
//! timestamp. Formatting goes through chrono's fixed `%Y-%m-%d` specifiers,
//! so names are identical across processes, hosts and locales.

use chrono::NaiveDate;

use crate::domain::{PartitionName, Timestamp};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATE_LEN: usize = "YYYY-MM-DD".len();

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionRouter {
    base_name: String,
}

impl PartitionRouter {
    pub fn new(base_name: impl Into<String>) -> Self {
        Self {
            base_name: base_name.into(),
        }
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn partition_for(&self, timestamp: Timestamp) -> PartitionName {
        self.partition_for_date(timestamp.date_naive())
    }

    pub fn partition_for_date(&self, date: NaiveDate) -> PartitionName {
        PartitionName::from_raw(format!("{}-{}", self.base_name, date.format(DATE_FORMAT)))
    }

    /// Date embedded in a partition name of this router's base.
    ///
    /// Accepts an optional `-<suffix>` after the date (re-indexed copies such
    /// as `nodestore-2024-01-01-reindex`). Returns `None` for anything else.
    pub fn date_of(&self, partition: &PartitionName) -> Option<NaiveDate> {
        let rest = partition
            .as_str()
            .strip_prefix(self.base_name.as_str())?
            .strip_prefix('-')?;
        let date_part = rest.get(..DATE_LEN)?;
        let suffix = &rest[DATE_LEN..];
        if !(suffix.is_empty() || suffix.starts_with('-')) {
            return None;
        }
        if !is_canonical_date(date_part) {
            return None;
        }
        NaiveDate::parse_from_str(date_part, DATE_FORMAT).ok()
    }
}

/// `DDDD-DD-DD` with ASCII digits only (chrono's parser also accepts
/// unpadded fields, which would let two names map to one day).
fn is_canonical_date(s: &str) -> bool {
    s.bytes().enumerate().all(|(i, b)| match i {
        4 | 7 => b == b'-',
        _ => b.is_ascii_digit(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rstest::rstest;

    fn router() -> PartitionRouter {
        PartitionRouter::new("nodestore")
    }

    #[test]
    fn routes_to_utc_day() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 13, 45, 0).unwrap();
        assert_eq!(router().partition_for(ts).as_str(), "nodestore-2024-01-01");
    }

    #[rstest]
    #[case(0, 0, 0)]
    #[case(12, 30, 15)]
    #[case(23, 59, 59)]
    fn same_day_same_partition(#[case] h: u32, #[case] m: u32, #[case] s: u32) {
        let morning = Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap();
        let other = Utc.with_ymd_and_hms(2024, 2, 29, h, m, s).unwrap();
        assert_eq!(router().partition_for(morning), router().partition_for(other));
    }

    #[test]
    fn midnight_starts_a_new_partition() {
        let before = Utc.with_ymd_and_hms(2024, 1, 1, 23, 59, 59).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        assert_ne!(router().partition_for(before), router().partition_for(after));
    }

    #[test]
    fn non_utc_offsets_route_by_utc_date() {
        use chrono::FixedOffset;
        // 2024-01-02 01:00 +09:00 == 2024-01-01 16:00 UTC
        let tokyo = FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 2, 1, 0, 0)
            .unwrap();
        let partition = router().partition_for(tokyo.with_timezone(&Utc));
        assert_eq!(partition.as_str(), "nodestore-2024-01-01");
    }

    #[rstest]
    #[case("nodestore-2024-01-01", Some((2024, 1, 1)))]
    #[case("nodestore-2024-01-01-reindex", Some((2024, 1, 1)))]
    #[case("nodestore-2024-13-01", None)]
    #[case("nodestore-2024-1-01", None)]
    #[case("nodestore-2024-01-01x", None)]
    #[case("nodestore-", None)]
    #[case("nodestore", None)]
    #[case("other-2024-01-01", None)]
    #[case("nodestore-archive-2024-01-01", None)]
    fn parses_dates_back(#[case] name: &str, #[case] expected: Option<(i32, u32, u32)>) {
        let expected = expected.map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap());
        assert_eq!(router().date_of(&PartitionName::from_raw(name)), expected);
    }

    #[test]
    fn base_names_with_dashes_roundtrip() {
        let router = PartitionRouter::new("sentry-nodes");
        let ts = Utc.with_ymd_and_hms(2023, 12, 31, 8, 0, 0).unwrap();
        let partition = router.partition_for(ts);
        assert_eq!(partition.as_str(), "sentry-nodes-2023-12-31");
        assert_eq!(router.date_of(&partition), Some(ts.date_naive()));
    }
}
