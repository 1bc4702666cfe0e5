//! Firestore request metrics.

use metrics::{counter, histogram};

/// Metric name constants.
pub mod names {
    /// Requests by operation and HTTP status.
    pub const REQUESTS_TOTAL: &str = "firestore_requests_total";

    /// Retries by operation.
    pub const RETRIES_TOTAL: &str = "firestore_retries_total";

    /// Request latency by operation.
    pub const LATENCY_SECONDS: &str = "firestore_latency_seconds";

    /// Optimistic writes rejected because the document moved.
    pub const PRECONDITION_CONFLICTS_TOTAL: &str = "firestore_precondition_conflicts_total";
}

pub fn record_request(operation: &'static str, status: u16, latency_secs: f64) {
    counter!(names::REQUESTS_TOTAL, "operation" => operation, "status" => status.to_string()).increment(1);
    histogram!(names::LATENCY_SECONDS, "operation" => operation).record(latency_secs);
}

pub fn record_retry(operation: &str) {
    counter!(names::RETRIES_TOTAL, "operation" => operation.to_string()).increment(1);
}

pub fn record_conflict(collection: &str) {
    counter!(names::PRECONDITION_CONFLICTS_TOTAL, "collection" => collection.to_string()).increment(1);
}
