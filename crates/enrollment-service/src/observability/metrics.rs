//! Metrics definitions for the enrollment service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `enrollment_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `operation`: enrollment operations and store queries, fixed in code
//! - `outcome`: `EnrollmentError::code()` values plus `success`
//! - `status`: success, conflict, timeout, rejected, error

use crate::errors::EnrollmentError;
use metrics::{counter, histogram};
use std::time::Duration;

// ============================================================================
// Enrollment Operations
// ============================================================================

/// Record a coordinator operation.
///
/// Metric: `enrollment_requests_total`, `enrollment_duration_seconds`
/// Labels: `operation`, `outcome`
pub fn record_operation(
    operation: &'static str,
    result: Result<(), &EnrollmentError>,
    duration: Duration,
) {
    let outcome = outcome_label(result);

    histogram!("enrollment_duration_seconds",
        "operation" => operation,
        "outcome" => outcome
    )
    .record(duration.as_secs_f64());

    counter!("enrollment_requests_total",
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
}

fn outcome_label(result: Result<(), &EnrollmentError>) -> &'static str {
    match result {
        Ok(()) => "success",
        Err(err) => err.code(),
    }
}

/// Record one allocate-and-persist attempt.
///
/// Metric: `enrollment_allocation_attempts_total`
/// Labels: `status` (bound, exhausted, conflict, error)
pub fn record_allocation_attempt(status: &'static str) {
    counter!("enrollment_allocation_attempts_total", "status" => status).increment(1);
}

/// Record a document render.
///
/// Metric: `enrollment_document_renders_total`
/// Labels: `status` (success, error)
pub fn record_document_render(status: &'static str) {
    counter!("enrollment_document_renders_total", "status" => status).increment(1);
}

// ============================================================================
// Database Metrics
// ============================================================================

/// Record a store query.
///
/// Metric: `enrollment_db_query_duration_seconds`, `enrollment_db_queries_total`
/// Labels: `operation`, `status`
pub fn record_db_query(operation: &'static str, status: &'static str, duration: Duration) {
    histogram!("enrollment_db_query_duration_seconds",
        "operation" => operation
    )
    .record(duration.as_secs_f64());

    counter!("enrollment_db_queries_total",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
}
