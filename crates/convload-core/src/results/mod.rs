pub mod export;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One verdict sent to the aggregator for a single completed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RequestRecord {
    /// Label the request is grouped under in the statistics (usually the path).
    pub name: String,
    /// HTTP method used (e.g. "POST").
    pub method: String,
    /// Round-trip time from send to the response body being fully read.
    pub elapsed_ms: f64,
    /// Number of bytes in the response body.
    pub size_bytes: u64,
    /// `None` on success, otherwise the failure message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl RequestRecord {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Aggregated statistics for one request name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EndpointStats {
    pub method: String,
    pub name: String,
    pub num_requests: u64,
    pub num_failures: u64,
    pub avg_response_time: f64,
    pub min_response_time: f64,
    pub max_response_time: f64,
    pub median_response_time: f64,
    pub p95_response_time: f64,
    pub p99_response_time: f64,
    pub total_content_length: u64,
    pub requests_per_second: f64,
}

/// Occurrences of one distinct failure message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FailureEntry {
    pub method: String,
    pub name: String,
    pub error: String,
    pub occurrences: u64,
}

/// Run-wide statistics, produced by the aggregator when the run stops.
///
/// The `num_requests`, `num_failures`, `avg_response_time` and `total_rps`
/// fields are the totals reported by the stop hooks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunStatistics {
    pub run_id: Uuid,
    pub host: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub num_requests: u64,
    pub num_failures: u64,
    /// Mean response time in milliseconds.
    pub avg_response_time: f64,
    pub min_response_time: f64,
    pub max_response_time: f64,
    pub median_response_time: f64,
    pub p95_response_time: f64,
    pub p99_response_time: f64,
    pub total_content_length: u64,
    /// Requests per second over the whole run.
    pub total_rps: f64,
    /// Per request-name breakdown, sorted by name.
    #[serde(default)]
    pub endpoints: Vec<EndpointStats>,
    /// Distinct failure messages, most frequent first.
    #[serde(default)]
    pub failures: Vec<FailureEntry>,
}

impl RunStatistics {
    /// Fraction of requests that failed, in `[0.0, 1.0]`.
    pub fn failure_ratio(&self) -> f64 {
        if self.num_requests > 0 {
            self.num_failures as f64 / self.num_requests as f64
        } else {
            0.0
        }
    }

    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as f64
            / 1000.0
    }
}
