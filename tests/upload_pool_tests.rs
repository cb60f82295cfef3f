// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Bulk upload worker pool behavior: backpressure, retries and shutdown.

use location_tracker::config::TrackingConfig;
use location_tracker::db::{PointFilter, TrajectoryStore};
use location_tracker::error::AppError;
use location_tracker::models::{BatchPointsRequest, CreateTrajectoryRequest, Trajectory};
use location_tracker::services::TrajectoryService;
use std::sync::Arc;
use std::time::Duration;

mod common;
use common::{eventually, fast_config, point_input, test_service, ControlledStore};

const WAIT: Duration = Duration::from_secs(5);

async fn start_trajectory(service: &TrajectoryService, user_id: &str) -> Trajectory {
    service
        .create_trajectory(
            user_id,
            CreateTrajectoryRequest {
                name: "Upload test".to_string(),
                description: None,
                start_time: 1_700_000_000_000,
            },
        )
        .await
        .expect("Failed to create trajectory")
}

fn batch(first_timestamp: i64, count: usize) -> BatchPointsRequest {
    BatchPointsRequest {
        points: (0..count as i64)
            .map(|i| point_input(first_timestamp + i))
            .collect(),
    }
}

async fn stored_points(store: &ControlledStore, trajectory_id: &str) -> u64 {
    store
        .count_points(&PointFilter::for_trajectory(trajectory_id))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_queue_full_fails_fast() {
    let store = Arc::new(ControlledStore::new());
    let config = TrackingConfig {
        worker_count: 1,
        queue_capacity: 3,
        ..fast_config()
    };
    let service = test_service(store.clone(), config);
    let trajectory = start_trajectory(&service, "alice").await;

    store.hold();

    // The only worker picks up the first task and blocks in the store.
    service
        .add_points_batch("alice", &trajectory.id, batch(1, 1))
        .await
        .unwrap();
    assert!(eventually(WAIT, || async { store.blocked() == 1 }).await);

    for i in 0..3 {
        service
            .add_points_batch("alice", &trajectory.id, batch(10 + i, 1))
            .await
            .unwrap();
    }
    assert_eq!(service.pool().pending(), 3);

    let started = std::time::Instant::now();
    let err = service
        .add_points_batch("alice", &trajectory.id, batch(100, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::QueueFull));
    assert!(started.elapsed() < Duration::from_secs(1));

    store.release();
    assert!(eventually(WAIT, || async { service.pool().metrics().succeeded == 4 }).await);
    service.shutdown().await;

    assert_eq!(stored_points(&store, &trajectory.id).await, 4);
}

#[tokio::test]
async fn test_retry_limit_then_dropped() {
    let store = Arc::new(ControlledStore::new());
    let service = test_service(store.clone(), fast_config());
    let trajectory = start_trajectory(&service, "alice").await;

    store.fail_transactions(0, u32::MAX);
    service
        .add_points_batch("alice", &trajectory.id, batch(1, 5))
        .await
        .unwrap();

    assert!(eventually(WAIT, || async { service.pool().metrics().failed == 1 }).await);

    // One initial attempt plus exactly retry_limit retries.
    let metrics = service.pool().metrics();
    assert_eq!(metrics.retried, 3);
    assert_eq!(store.transaction_calls(), 4);

    // The task never comes back.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(store.transaction_calls(), 4);
    assert_eq!(service.pool().pending(), 0);
    assert_eq!(stored_points(&store, &trajectory.id).await, 0);

    service.shutdown().await;
}

#[tokio::test]
async fn test_transient_failure_recovers() {
    let store = Arc::new(ControlledStore::new());
    let service = test_service(store.clone(), fast_config());
    let trajectory = start_trajectory(&service, "alice").await;

    store.fail_transactions(0, 2);
    service
        .add_points_batch("alice", &trajectory.id, batch(1, 10))
        .await
        .unwrap();

    assert!(eventually(WAIT, || async { service.pool().metrics().succeeded == 1 }).await);
    assert_eq!(service.pool().metrics().retried, 2);
    assert_eq!(service.pool().metrics().failed, 0);

    // Stats catch up asynchronously.
    let id = trajectory.id.clone();
    assert!(
        eventually(WAIT, || {
            let store = store.clone();
            let id = id.clone();
            async move {
                store
                    .get_trajectory(&id)
                    .await
                    .unwrap()
                    .is_some_and(|t| t.point_count == 10)
            }
        })
        .await
    );

    service.shutdown().await;
}

#[tokio::test]
async fn test_retry_resumes_after_committed_sub_batches() {
    let store = Arc::new(ControlledStore::new());
    let config = TrackingConfig {
        worker_count: 1,
        sub_batch_size: 2,
        ..fast_config()
    };
    let service = test_service(store.clone(), config);
    let trajectory = start_trajectory(&service, "alice").await;

    // First sub-batch commits, second fails once.
    store.fail_transactions(1, 1);
    service
        .add_points_batch("alice", &trajectory.id, batch(1, 5))
        .await
        .unwrap();

    assert!(eventually(WAIT, || async { service.pool().metrics().succeeded == 1 }).await);
    service.shutdown().await;

    assert_eq!(stored_points(&store, &trajectory.id).await, 5);
    assert_eq!(store.transaction_calls(), 4);
    assert_eq!(service.pool().metrics().points_persisted, 5);
}

#[tokio::test]
async fn test_shutdown_finishes_current_sub_batch_and_drops_queue() {
    let store = Arc::new(ControlledStore::new());
    let config = TrackingConfig {
        worker_count: 1,
        sub_batch_size: 1,
        ..fast_config()
    };
    let service = test_service(store.clone(), config);
    let trajectory = start_trajectory(&service, "alice").await;

    store.hold();
    service
        .add_points_batch("alice", &trajectory.id, batch(1, 3))
        .await
        .unwrap();
    assert!(eventually(WAIT, || async { store.blocked() == 1 }).await);
    service
        .add_points_batch("alice", &trajectory.id, batch(10, 2))
        .await
        .unwrap();

    let shutdown = {
        let service = service.clone();
        tokio::spawn(async move { service.shutdown().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!shutdown.is_finished());

    store.release();
    shutdown.await.unwrap();

    // The in-flight sub-batch landed; the rest of that task and the queued
    // task were abandoned.
    assert_eq!(stored_points(&store, &trajectory.id).await, 1);
    let metrics = service.pool().metrics();
    assert_eq!(metrics.dropped_on_shutdown, 2);
    assert_eq!(metrics.succeeded, 0);

    // Aggregation drained before shutdown returned.
    let stored = store.get_trajectory(&trajectory.id).await.unwrap().unwrap();
    assert_eq!(stored.point_count, 1);

    let err = service
        .add_points_batch("alice", &trajectory.id, batch(20, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ShuttingDown));
}

#[tokio::test]
async fn test_oversized_batch_rejected_before_queue() {
    let store = Arc::new(ControlledStore::new());
    let service = test_service(store.clone(), fast_config());
    let trajectory = start_trajectory(&service, "alice").await;

    let err = service
        .add_points_batch("alice", &trajectory.id, batch(1, 1001))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { ref field, .. } if field == "points"));
    assert_eq!(service.pool().metrics().submitted, 0);

    // Exactly the maximum is fine.
    service
        .add_points_batch("alice", &trajectory.id, batch(1, 1000))
        .await
        .unwrap();
    assert_eq!(service.pool().metrics().submitted, 1);

    service.shutdown().await;
}

#[tokio::test]
async fn test_batch_for_foreign_trajectory_is_not_found() {
    let store = Arc::new(ControlledStore::new());
    let service = test_service(store, fast_config());
    let trajectory = start_trajectory(&service, "alice").await;

    let err = service
        .add_points_batch("mallory", &trajectory.id, batch(1, 3))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    service.shutdown().await;
}
