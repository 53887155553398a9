use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::results::{EndpointStats, FailureEntry, RequestRecord, RunStatistics};

// ---------------------------------------------------------------------------
// ResponseTimes: accumulator shared by the totals and each request name
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct ResponseTimes {
    requests: u64,
    failures: u64,
    /// All individual response times (ms), kept for percentile computation.
    response_times: Vec<f64>,
    min_ms: f64,
    max_ms: f64,
    sum_ms: f64,
    total_bytes: u64,
}

impl ResponseTimes {
    fn new() -> Self {
        Self {
            requests: 0,
            failures: 0,
            response_times: Vec::new(),
            min_ms: f64::INFINITY,
            max_ms: 0.0,
            sum_ms: 0.0,
            total_bytes: 0,
        }
    }

    fn record(&mut self, elapsed_ms: f64, success: bool, size_bytes: u64) {
        self.requests += 1;
        if !success {
            self.failures += 1;
        }
        self.response_times.push(elapsed_ms);
        self.sum_ms += elapsed_ms;
        self.min_ms = self.min_ms.min(elapsed_ms);
        self.max_ms = self.max_ms.max(elapsed_ms);
        self.total_bytes += size_bytes;
    }

    fn mean(&self) -> f64 {
        if self.requests > 0 {
            self.sum_ms / self.requests as f64
        } else {
            0.0
        }
    }

    fn min(&self) -> f64 {
        if self.min_ms.is_finite() {
            self.min_ms
        } else {
            0.0
        }
    }

    /// Nearest-rank percentile. `p` must be in the range (0.0, 100.0].
    fn percentile(&self, p: f64) -> f64 {
        if self.response_times.is_empty() {
            return 0.0;
        }
        let mut sorted = self.response_times.clone();
        sorted.sort_unstable_by(f64::total_cmp);
        let idx = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
        let idx = idx.saturating_sub(1).min(sorted.len() - 1);
        sorted[idx]
    }

    fn rate(&self, elapsed_secs: f64) -> f64 {
        if elapsed_secs < 0.001 {
            0.0
        } else {
            self.requests as f64 / elapsed_secs
        }
    }
}

// ---------------------------------------------------------------------------
// AggregatorSnapshot: lightweight read for progress logging
// ---------------------------------------------------------------------------

/// A point-in-time snapshot of the aggregator, cheap enough to take on every
/// progress tick (no percentile sort).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AggregatorSnapshot {
    pub total_requests: u64,
    pub total_failures: u64,
    pub mean_ms: f64,
    pub current_rps: f64,
    pub elapsed_ms: u64,
}

// ---------------------------------------------------------------------------
// StreamingAggregator
// ---------------------------------------------------------------------------

/// Collects request verdicts into run-wide statistics.
///
/// Owned by the runner's aggregation loop; the progress task reads it through
/// an `Arc<RwLock<_>>`.
pub struct StreamingAggregator {
    run_id: Uuid,
    host: String,
    total: ResponseTimes,
    /// Keyed by (name, method) so the breakdown comes out sorted by name.
    endpoints: BTreeMap<(String, String), ResponseTimes>,
    /// Keyed by (method, name, message).
    failures: HashMap<(String, String, String), u64>,
    start_time: Instant,
    started_at: DateTime<Utc>,
}

impl StreamingAggregator {
    /// Create a new aggregator, capturing the current wall-clock start time.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            host: host.into(),
            total: ResponseTimes::new(),
            endpoints: BTreeMap::new(),
            failures: HashMap::new(),
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Record the verdict of a single completed request.
    pub fn record(&mut self, record: &RequestRecord) {
        let success = record.is_success();
        self.total
            .record(record.elapsed_ms, success, record.size_bytes);
        self.endpoints
            .entry((record.name.clone(), record.method.clone()))
            .or_insert_with(ResponseTimes::new)
            .record(record.elapsed_ms, success, record.size_bytes);

        if let Some(message) = &record.failure {
            *self
                .failures
                .entry((record.method.clone(), record.name.clone(), message.clone()))
                .or_insert(0) += 1;
        }
    }

    /// Requests per second averaged over the entire elapsed duration.
    fn current_rps(&self) -> f64 {
        self.total.rate(self.start_time.elapsed().as_secs_f64())
    }

    /// Return a lightweight snapshot suitable for progress logging.
    pub fn snapshot(&self) -> AggregatorSnapshot {
        AggregatorSnapshot {
            total_requests: self.total.requests,
            total_failures: self.total.failures,
            mean_ms: self.total.mean(),
            current_rps: self.current_rps(),
            elapsed_ms: self.start_time.elapsed().as_millis() as u64,
        }
    }

    /// Build the final [`RunStatistics`] from everything recorded so far.
    pub fn statistics(&self) -> RunStatistics {
        let elapsed_secs = self.start_time.elapsed().as_secs_f64();

        let endpoints = self
            .endpoints
            .iter()
            .map(|((name, method), times)| EndpointStats {
                method: method.clone(),
                name: name.clone(),
                num_requests: times.requests,
                num_failures: times.failures,
                avg_response_time: times.mean(),
                min_response_time: times.min(),
                max_response_time: times.max_ms,
                median_response_time: times.percentile(50.0),
                p95_response_time: times.percentile(95.0),
                p99_response_time: times.percentile(99.0),
                total_content_length: times.total_bytes,
                requests_per_second: times.rate(elapsed_secs),
            })
            .collect();

        let mut failures: Vec<FailureEntry> = self
            .failures
            .iter()
            .map(|((method, name, error), occurrences)| FailureEntry {
                method: method.clone(),
                name: name.clone(),
                error: error.clone(),
                occurrences: *occurrences,
            })
            .collect();
        failures.sort_by(|a, b| {
            b.occurrences
                .cmp(&a.occurrences)
                .then_with(|| a.error.cmp(&b.error))
        });

        RunStatistics {
            run_id: self.run_id,
            host: self.host.clone(),
            started_at: self.started_at,
            finished_at: Utc::now(),
            num_requests: self.total.requests,
            num_failures: self.total.failures,
            avg_response_time: self.total.mean(),
            min_response_time: self.total.min(),
            max_response_time: self.total.max_ms,
            median_response_time: self.total.percentile(50.0),
            p95_response_time: self.total.percentile(95.0),
            p99_response_time: self.total.percentile(99.0),
            total_content_length: self.total.total_bytes,
            total_rps: self.total.rate(elapsed_secs),
            endpoints,
            failures,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn record(elapsed_ms: f64, failure: Option<&str>, size_bytes: u64) -> RequestRecord {
        RequestRecord {
            name: "/convert".to_string(),
            method: "POST".to_string(),
            elapsed_ms,
            size_bytes,
            failure: failure.map(str::to_string),
        }
    }

    #[test]
    fn record_updates_counts_and_min_max() {
        let mut agg = StreamingAggregator::new("http://localhost:8080");
        agg.record(&record(100.0, None, 512));
        agg.record(&record(200.0, Some("Failed with status code: 500"), 1024));
        agg.record(&record(50.0, None, 256));

        let stats = agg.statistics();
        assert_eq!(stats.num_requests, 3);
        assert_eq!(stats.num_failures, 1);
        assert_eq!(stats.min_response_time, 50.0);
        assert_eq!(stats.max_response_time, 200.0);
        assert!((stats.avg_response_time - 116.666).abs() < 0.01);
        assert_eq!(stats.total_content_length, 1792);
    }

    #[test]
    fn empty_aggregator_reports_zeroes() {
        let agg = StreamingAggregator::new("http://localhost:8080");
        let stats = agg.statistics();
        assert_eq!(stats.num_requests, 0);
        assert_eq!(stats.num_failures, 0);
        assert_eq!(stats.avg_response_time, 0.0);
        assert_eq!(stats.min_response_time, 0.0);
        assert_eq!(stats.median_response_time, 0.0);
        assert_eq!(stats.total_rps, 0.0);
        assert!(stats.endpoints.is_empty());
        assert!(stats.failures.is_empty());
    }

    #[test]
    fn percentile_multiple_entries_are_correct() {
        let mut agg = StreamingAggregator::new("http://localhost:8080");
        for ms in [10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 100.0] {
            agg.record(&record(ms, None, 0));
        }
        // p50 of 10 sorted values => index ceil(0.5 * 10) - 1 = 4 => value 50
        let stats = agg.statistics();
        assert_eq!(stats.median_response_time, 50.0);
        assert_eq!(stats.p95_response_time, 100.0);
        assert_eq!(stats.p99_response_time, 100.0);
        assert_eq!(agg.total.percentile(90.0), 90.0);
    }

    #[test]
    fn percentile_is_not_affected_by_insertion_order() {
        let mut ordered = StreamingAggregator::new("h");
        let mut reversed = StreamingAggregator::new("h");
        for ms in [10.0, 50.0, 100.0, 200.0, 500.0] {
            ordered.record(&record(ms, None, 0));
        }
        for ms in [500.0, 200.0, 100.0, 50.0, 10.0] {
            reversed.record(&record(ms, None, 0));
        }
        let (ordered, reversed) = (ordered.statistics(), reversed.statistics());
        assert_eq!(ordered.median_response_time, reversed.median_response_time);
        assert_eq!(ordered.p95_response_time, reversed.p95_response_time);
    }

    #[test]
    fn failures_are_grouped_by_message_most_frequent_first() {
        let mut agg = StreamingAggregator::new("h");
        agg.record(&record(1.0, Some("Failed with status code: 500"), 0));
        agg.record(&record(1.0, Some("Failed with status code: 503"), 0));
        agg.record(&record(1.0, Some("Failed with status code: 503"), 0));
        agg.record(&record(1.0, None, 0));

        let stats = agg.statistics();
        assert_eq!(stats.failures.len(), 2);
        assert_eq!(stats.failures[0].error, "Failed with status code: 503");
        assert_eq!(stats.failures[0].occurrences, 2);
        assert_eq!(stats.failures[1].occurrences, 1);
        assert_eq!(stats.failures[0].method, "POST");
        assert_eq!(stats.failures[0].name, "/convert");
    }

    #[test]
    fn endpoints_are_broken_down_by_name() {
        let mut agg = StreamingAggregator::new("h");
        agg.record(&record(10.0, None, 5));
        let mut other = record(30.0, None, 7);
        other.name = "/health".to_string();
        other.method = "GET".to_string();
        agg.record(&other);

        let stats = agg.statistics();
        assert_eq!(stats.endpoints.len(), 2);
        assert_eq!(stats.endpoints[0].name, "/convert");
        assert_eq!(stats.endpoints[0].total_content_length, 5);
        assert_eq!(stats.endpoints[1].name, "/health");
        assert_eq!(stats.endpoints[1].method, "GET");
        assert_eq!(stats.endpoints[1].avg_response_time, 30.0);
    }

    #[test]
    fn snapshot_after_recording_reflects_state() {
        let mut agg = StreamingAggregator::new("h");
        agg.record(&record(100.0, None, 500));
        agg.record(&record(200.0, Some("boom"), 1000));

        let snap = agg.snapshot();
        assert_eq!(snap.total_requests, 2);
        assert_eq!(snap.total_failures, 1);
        assert!((snap.mean_ms - 150.0).abs() < 0.001);
        assert!(snap.current_rps >= 0.0);
    }

    #[test]
    fn statistics_carry_host_and_run_id() {
        let agg = StreamingAggregator::new("http://example.com");
        let stats = agg.statistics();
        assert_eq!(stats.host, "http://example.com");
        assert_eq!(stats.run_id, agg.run_id());
        assert!(stats.finished_at >= stats.started_at);
    }
}
