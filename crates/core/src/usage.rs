//! Usage records, aggregate statistics, and the in-memory ledger that
//! answers per-key aggregate queries.

use crate::error::UsageError;
use crate::range::TimeRange;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::RwLock;

/// One completed upstream call attributed to an API key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub api_key_id: i64,
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_creation_tokens: i64,
    pub cache_read_tokens: i64,
    /// Nominal cost in USD.
    pub cost: f64,
    /// Billed cost in USD after the key's rate multiplier.
    pub actual_cost: f64,
    pub duration_ms: i64,
    pub created_at: DateTime<Utc>,
}

impl UsageRecord {
    /// Sum of all token categories, saturating at `i64::MAX`.
    pub fn total_tokens(&self) -> i64 {
        self.input_tokens
            .saturating_add(self.output_tokens)
            .saturating_add(self.cache_creation_tokens)
            .saturating_add(self.cache_read_tokens)
    }
}

/// Aggregate counters for one key over a time range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    pub total_requests: i64,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
    pub total_cache_creation_tokens: i64,
    pub total_cache_read_tokens: i64,
    pub total_tokens: i64,
    pub total_cost: f64,
    pub total_actual_cost: f64,
    pub average_duration_ms: f64,
}

/// Computes aggregate usage for a key.
#[async_trait]
pub trait UsageAggregator: Send + Sync {
    async fn detailed_stats(
        &self,
        api_key_id: i64,
        range: &TimeRange,
    ) -> Result<UsageStats, UsageError>;
}

/// Bounded in-memory ring buffer of usage records.
pub struct UsageLedger {
    records: RwLock<VecDeque<UsageRecord>>,
    capacity: usize,
}

impl UsageLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: RwLock::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity: capacity.max(1),
        }
    }

    /// Append a record. Evicts the oldest if at capacity.
    pub fn record(&self, record: UsageRecord) -> Result<(), UsageError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| UsageError::Internal("usage ledger lock poisoned".into()))?;
        if records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn aggregate(&self, api_key_id: i64, range: &TimeRange) -> Result<UsageStats, UsageError> {
        let records = self
            .records
            .read()
            .map_err(|_| UsageError::Aggregator("usage ledger lock poisoned".into()))?;

        // Counters saturate instead of overflowing on huge ingested values
        let mut stats = UsageStats::default();
        let mut total_duration: i64 = 0;
        for r in records
            .iter()
            .filter(|r| r.api_key_id == api_key_id && range.contains(&r.created_at))
        {
            stats.total_requests = stats.total_requests.saturating_add(1);
            stats.total_input_tokens = stats.total_input_tokens.saturating_add(r.input_tokens);
            stats.total_output_tokens = stats.total_output_tokens.saturating_add(r.output_tokens);
            stats.total_cache_creation_tokens = stats
                .total_cache_creation_tokens
                .saturating_add(r.cache_creation_tokens);
            stats.total_cache_read_tokens =
                stats.total_cache_read_tokens.saturating_add(r.cache_read_tokens);
            stats.total_tokens = stats.total_tokens.saturating_add(r.total_tokens());
            stats.total_cost += r.cost;
            stats.total_actual_cost += r.actual_cost;
            total_duration = total_duration.saturating_add(r.duration_ms);
        }
        if stats.total_requests > 0 {
            stats.average_duration_ms = total_duration as f64 / stats.total_requests as f64;
        }
        Ok(stats)
    }
}

#[async_trait]
impl UsageAggregator for UsageLedger {
    async fn detailed_stats(
        &self,
        api_key_id: i64,
        range: &TimeRange,
    ) -> Result<UsageStats, UsageError> {
        self.aggregate(api_key_id, range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use chrono_tz::Tz;

    fn make_record(api_key_id: i64, created_at: DateTime<Utc>, duration_ms: i64) -> UsageRecord {
        UsageRecord {
            api_key_id,
            model: "claude-sonnet-4-5".to_string(),
            input_tokens: 100,
            output_tokens: 50,
            cache_creation_tokens: 10,
            cache_read_tokens: 5,
            cost: 0.25,
            actual_cost: 0.5,
            duration_ms,
            created_at,
        }
    }

    fn day_range(tz: Tz, y: i32, m: u32, d: u32) -> TimeRange {
        let start = tz.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap();
        TimeRange {
            start,
            end: start + Duration::days(1) - Duration::nanoseconds(1),
        }
    }

    #[tokio::test]
    async fn test_aggregates_matching_records() {
        let ledger = UsageLedger::new(100);
        let noon = Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap();
        ledger.record(make_record(1, noon, 100)).unwrap();
        ledger.record(make_record(1, noon, 300)).unwrap();

        let stats = ledger
            .detailed_stats(1, &day_range(Tz::UTC, 2024, 1, 10))
            .await
            .unwrap();
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.total_input_tokens, 200);
        assert_eq!(stats.total_output_tokens, 100);
        assert_eq!(stats.total_cache_creation_tokens, 20);
        assert_eq!(stats.total_cache_read_tokens, 10);
        assert_eq!(stats.total_tokens, 330);
        assert!((stats.total_cost - 0.5).abs() < 1e-9);
        assert!((stats.total_actual_cost - 1.0).abs() < 1e-9);
        assert!((stats.average_duration_ms - 200.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_isolates_keys() {
        let ledger = UsageLedger::new(100);
        let noon = Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap();
        ledger.record(make_record(1, noon, 100)).unwrap();
        ledger.record(make_record(2, noon, 100)).unwrap();

        let stats = ledger
            .detailed_stats(2, &day_range(Tz::UTC, 2024, 1, 10))
            .await
            .unwrap();
        assert_eq!(stats.total_requests, 1);
    }

    #[tokio::test]
    async fn test_range_bounds_are_inclusive_and_zone_aware() {
        let ledger = UsageLedger::new(100);
        // Shanghai day 2024-01-10 spans 2024-01-09T16:00Z ..= 2024-01-10T15:59:59.999999999Z
        let first = Utc.with_ymd_and_hms(2024, 1, 9, 16, 0, 0).unwrap();
        let last = Utc.with_ymd_and_hms(2024, 1, 10, 16, 0, 0).unwrap() - Duration::nanoseconds(1);
        let outside = Utc.with_ymd_and_hms(2024, 1, 10, 16, 0, 0).unwrap();
        ledger.record(make_record(1, first, 10)).unwrap();
        ledger.record(make_record(1, last, 10)).unwrap();
        ledger.record(make_record(1, outside, 10)).unwrap();

        let stats = ledger
            .detailed_stats(1, &day_range(Tz::Asia__Shanghai, 2024, 1, 10))
            .await
            .unwrap();
        assert_eq!(stats.total_requests, 2);
    }

    #[tokio::test]
    async fn test_empty_range_has_zero_average() {
        let ledger = UsageLedger::new(10);
        let stats = ledger
            .detailed_stats(1, &day_range(Tz::UTC, 2024, 1, 10))
            .await
            .unwrap();
        assert_eq!(stats, UsageStats::default());
    }

    #[tokio::test]
    async fn test_huge_counters_saturate() {
        let ledger = UsageLedger::new(10);
        let noon = Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap();
        for _ in 0..2 {
            let mut record = make_record(1, noon, i64::MAX / 2 + 1);
            record.input_tokens = i64::MAX / 2 + 1;
            ledger.record(record).unwrap();
        }

        let stats = ledger
            .detailed_stats(1, &day_range(Tz::UTC, 2024, 1, 10))
            .await
            .unwrap();
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.total_input_tokens, i64::MAX);
        assert_eq!(stats.total_tokens, i64::MAX);
        assert_eq!(stats.total_output_tokens, 100);
    }

    #[test]
    fn test_total_tokens_saturates() {
        let noon = Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap();
        let mut record = make_record(1, noon, 1);
        record.input_tokens = i64::MAX;
        assert_eq!(record.total_tokens(), i64::MAX);
    }

    #[test]
    fn test_capacity_eviction() {
        let ledger = UsageLedger::new(3);
        let t = Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap();
        for i in 0..5 {
            ledger.record(make_record(i, t, 1)).unwrap();
        }
        assert_eq!(ledger.len(), 3);
        let oldest = ledger.records.read().unwrap().front().unwrap().api_key_id;
        assert_eq!(oldest, 2);
    }
}
