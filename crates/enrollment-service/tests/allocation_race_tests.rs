//! Concurrent enrollment tests.
//!
//! Many tasks enroll into the same scope at once. Capacity must never be
//! exceeded and every seat must go to exactly one student.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use enrollment_service::errors::EnrollmentError;
use enrollment_service::services::{AllocationPolicy, EnrollmentCoordinator};
use enrollment_test_utils::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

fn shared_coordinator(store: &Arc<InMemoryEnrollmentStore>) -> Arc<EnrollmentCoordinator> {
    Arc::new(
        EnrollmentCoordinator::new(store.clone(), Arc::new(MockRenderer::succeeding()))
            .with_policy(AllocationPolicy {
                max_attempts: 3,
                retry_backoff: Duration::from_millis(1),
                store_call_timeout: Duration::from_secs(5),
            }),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_enrollments_never_exceed_capacity() {
    let store = Arc::new(InMemoryEnrollmentStore::new());
    let scope = store.add_scope("NORTH", "MORNING", "2026-I").await;
    let room_a = store.add_classroom(scope, "A", 3, 1).await;
    let room_b = store.add_classroom(scope, "B", 2, 2).await;
    let coordinator = shared_coordinator(&store);

    let num_concurrent = 12;
    let barrier = Arc::new(Barrier::new(num_concurrent));

    let handles: Vec<_> = (0..num_concurrent)
        .map(|i| {
            let coordinator = Arc::clone(&coordinator);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                coordinator
                    .enroll(request(scope, &format!("D-{}", i)), None)
                    .await
            })
        })
        .collect();

    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.expect("task should not panic"))
        .collect();

    let enrolled: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    let refused = results
        .iter()
        .filter(|r| matches!(r, Err(EnrollmentError::NoSeatsAvailable)))
        .count();

    assert_eq!(enrolled.len(), 5, "total capacity is 5");
    assert_eq!(refused, num_concurrent - 5);

    let ids: HashSet<_> = enrolled.iter().map(|r| r.student_id).collect();
    assert_eq!(ids.len(), 5, "every seat belongs to one student");

    assert_eq!(store.occupancy(room_a).await, 3);
    assert_eq!(store.occupancy(room_b).await, 2);
    assert_eq!(store.student_count().await, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_enrollments_in_separate_scopes() {
    let store = Arc::new(InMemoryEnrollmentStore::new());
    let north = store.add_scope("NORTH", "MORNING", "2026-I").await;
    let south = store.add_scope("SOUTH", "MORNING", "2026-I").await;
    let north_room = store.add_classroom(north, "N1", 4, 1).await;
    let south_room = store.add_classroom(south, "S1", 4, 1).await;
    let coordinator = shared_coordinator(&store);

    let num_concurrent = 10;
    let barrier = Arc::new(Barrier::new(num_concurrent));

    let handles: Vec<_> = (0..num_concurrent)
        .map(|i| {
            let coordinator = Arc::clone(&coordinator);
            let barrier = Arc::clone(&barrier);
            let scope = if i % 2 == 0 { north } else { south };
            tokio::spawn(async move {
                barrier.wait().await;
                coordinator
                    .enroll(request(scope, &format!("D-{}", i)), None)
                    .await
            })
        })
        .collect();

    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.expect("task should not panic"))
        .collect();

    for receipt in results.iter().filter_map(|r| r.as_ref().ok()) {
        let expected = if receipt.placement.scope() == north {
            north_room
        } else {
            south_room
        };
        assert_eq!(receipt.placement.classroom_id, expected);
    }

    assert_eq!(store.occupancy(north_room).await, 4);
    assert_eq!(store.occupancy(south_room).await, 4);
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_enrollments_with_removals() {
    let store = Arc::new(InMemoryEnrollmentStore::new());
    let scope = store.add_scope("NORTH", "MORNING", "2026-I").await;
    let room = store.add_classroom(scope, "A", 2, 1).await;
    let coordinator = shared_coordinator(&store);

    let first = coordinator
        .enroll(request(scope, "SEED-1"), None)
        .await
        .unwrap();
    coordinator
        .enroll(request(scope, "SEED-2"), None)
        .await
        .unwrap();

    let barrier = Arc::new(Barrier::new(5));
    let remover = {
        let coordinator = Arc::clone(&coordinator);
        let barrier = Arc::clone(&barrier);
        tokio::spawn(async move {
            barrier.wait().await;
            coordinator.remove(first.student_id).await
        })
    };
    let enrollers: Vec<_> = (0..4)
        .map(|i| {
            let coordinator = Arc::clone(&coordinator);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                coordinator
                    .enroll(request(scope, &format!("D-{}", i)), None)
                    .await
            })
        })
        .collect();

    remover.await.unwrap().unwrap();
    let results = futures::future::join_all(enrollers).await;
    let enrolled = results
        .into_iter()
        .map(|r| r.unwrap())
        .filter(|r| r.is_ok())
        .count();

    // Only the freed seat can be taken, and only if an enroller ran after the
    // removal.
    assert!(enrolled <= 1);
    assert!(store.occupancy(room).await <= 2);
    assert_eq!(store.occupancy(room).await, 1 + enrolled as i64);
}
