//! Metrics emitted by the enrollment coordinator.
//!
//! Uses a thread-local debugging recorder, so each test drives the
//! coordinator on a current-thread runtime inside the recorder scope.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use enrollment_service::services::{AllocationPolicy, EnrollmentCoordinator};
use enrollment_test_utils::*;
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use std::sync::Arc;
use std::time::Duration;

fn counter_value(snapshotter: &Snapshotter, name: &str, label: (&str, &str)) -> u64 {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .filter_map(|(key, _, _, value)| {
            let key = key.key();
            let matches = key.name() == name
                && key
                    .labels()
                    .any(|l| l.key() == label.0 && l.value() == label.1);
            match (matches, value) {
                (true, DebugValue::Counter(count)) => Some(count),
                _ => None,
            }
        })
        .sum()
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

#[test]
fn test_enroll_records_outcomes_and_attempts() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        runtime().block_on(async {
            let store = Arc::new(InMemoryEnrollmentStore::new());
            let scope = store.add_scope("NORTH", "MORNING", "2026-I").await;
            store.add_classroom(scope, "A", 1, 1).await;
            let coordinator =
                EnrollmentCoordinator::new(store.clone(), Arc::new(MockRenderer::succeeding()))
                    .with_policy(AllocationPolicy {
                        max_attempts: 3,
                        retry_backoff: Duration::from_millis(1),
                        store_call_timeout: Duration::from_secs(2),
                    });

            store.fail_next_enrolls_with_conflict(1);
            coordinator
                .enroll(request(scope, "1001"), None)
                .await
                .unwrap();
            coordinator
                .enroll(request(scope, "1002"), None)
                .await
                .unwrap_err();
        });
    });

    assert_eq!(
        counter_value(&snapshotter, "enrollment_requests_total", ("outcome", "success")),
        1
    );
    assert_eq!(
        counter_value(
            &snapshotter,
            "enrollment_requests_total",
            ("outcome", "NO_SEATS_AVAILABLE")
        ),
        1
    );
    assert_eq!(
        counter_value(
            &snapshotter,
            "enrollment_allocation_attempts_total",
            ("status", "conflict")
        ),
        1
    );
    assert_eq!(
        counter_value(
            &snapshotter,
            "enrollment_allocation_attempts_total",
            ("status", "bound")
        ),
        1
    );
    assert_eq!(
        counter_value(
            &snapshotter,
            "enrollment_document_renders_total",
            ("status", "success")
        ),
        1
    );
}

#[test]
fn test_render_failure_is_counted() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        runtime().block_on(async {
            let store = Arc::new(InMemoryEnrollmentStore::new());
            let scope = store.add_scope("NORTH", "MORNING", "2026-I").await;
            store.add_classroom(scope, "A", 5, 1).await;
            let coordinator =
                EnrollmentCoordinator::new(store.clone(), Arc::new(MockRenderer::failing()));

            coordinator
                .enroll(request(scope, "1001"), None)
                .await
                .unwrap_err();
        });
    });

    assert_eq!(
        counter_value(
            &snapshotter,
            "enrollment_document_renders_total",
            ("status", "error")
        ),
        1
    );
    assert_eq!(
        counter_value(
            &snapshotter,
            "enrollment_requests_total",
            ("outcome", "DOCUMENT_RENDER_ERROR")
        ),
        1
    );
}
