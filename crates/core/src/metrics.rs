use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Lightweight in-memory service metrics using atomic counters.
pub struct Metrics {
    pub total_requests: AtomicU64,
    pub total_errors: AtomicU64,
    /// Successful public usage lookups.
    pub usage_queries: AtomicU64,
    /// Public usage lookups rejected with a 4xx.
    pub usage_rejections: AtomicU64,
    /// Records accepted by the ingestion endpoint.
    pub usage_records: AtomicU64,
    /// Latency histogram buckets (ms): <10, <50, <100, <500, <1000, >=1000.
    pub latency_buckets: [AtomicU64; 6],
    total_latency_ms: AtomicU64,
    created_at: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            usage_queries: AtomicU64::new(0),
            usage_rejections: AtomicU64::new(0),
            usage_records: AtomicU64::new(0),
            latency_buckets: Default::default(),
            total_latency_ms: AtomicU64::new(0),
            created_at: Instant::now(),
        }
    }

    /// Record a finished HTTP exchange.
    pub fn record_response(&self, status: u16, latency_ms: u128) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if status >= 500 {
            self.total_errors.fetch_add(1, Ordering::Relaxed);
        }
        let bucket = match latency_ms {
            0..=9 => 0,
            10..=49 => 1,
            50..=99 => 2,
            100..=499 => 3,
            500..=999 => 4,
            _ => 5,
        };
        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms
            .fetch_add(latency_ms as u64, Ordering::Relaxed);
    }

    pub fn record_usage_query(&self) {
        self.usage_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_usage_rejection(&self) {
        self.usage_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_usage_ingest(&self) {
        self.usage_records.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot current metrics as a JSON-serializable value.
    pub fn snapshot(&self) -> serde_json::Value {
        let total_reqs = self.total_requests.load(Ordering::Relaxed);
        let avg_latency = if total_reqs > 0 {
            self.total_latency_ms.load(Ordering::Relaxed) as f64 / total_reqs as f64
        } else {
            0.0
        };

        serde_json::json!({
            "total_requests": total_reqs,
            "total_errors": self.total_errors.load(Ordering::Relaxed),
            "usage_queries": self.usage_queries.load(Ordering::Relaxed),
            "usage_rejections": self.usage_rejections.load(Ordering::Relaxed),
            "usage_records": self.usage_records.load(Ordering::Relaxed),
            "latency_ms": {
                "<10": self.latency_buckets[0].load(Ordering::Relaxed),
                "10-49": self.latency_buckets[1].load(Ordering::Relaxed),
                "50-99": self.latency_buckets[2].load(Ordering::Relaxed),
                "100-499": self.latency_buckets[3].load(Ordering::Relaxed),
                "500-999": self.latency_buckets[4].load(Ordering::Relaxed),
                ">=1000": self.latency_buckets[5].load(Ordering::Relaxed),
            },
            "avg_latency_ms": avg_latency,
            "uptime_seconds": self.created_at.elapsed().as_secs(),
        })
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_metrics() {
        let m = Metrics::new();
        m.record_response(200, 5);
        m.record_response(404, 70);
        m.record_response(500, 2000);
        m.record_usage_query();
        m.record_usage_rejection();
        m.record_usage_ingest();
        m.record_usage_ingest();

        let snap = m.snapshot();
        assert_eq!(snap["total_requests"], 3);
        assert_eq!(snap["total_errors"], 1);
        assert_eq!(snap["usage_queries"], 1);
        assert_eq!(snap["usage_rejections"], 1);
        assert_eq!(snap["usage_records"], 2);
        assert_eq!(snap["latency_ms"]["<10"], 1);
        assert_eq!(snap["latency_ms"]["50-99"], 1);
        assert_eq!(snap["latency_ms"][">=1000"], 1);
    }
}
