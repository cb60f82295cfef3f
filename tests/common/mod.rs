// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use location_tracker::config::{Config, TrackingConfig};
use location_tracker::db::{
    FirestoreDb, MemoryStore, PointFilter, StoreError, StoreResult, TrajectoryFilter,
    TrajectoryStore, WriteOp,
};
use location_tracker::models::{LocationPoint, PointInput, Trajectory, TrajectoryChanges};
use location_tracker::routes::create_router;
use location_tracker::services::TrajectoryService;
use location_tracker::AppState;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Tracking settings with short retry delays.
#[allow(dead_code)]
pub fn fast_config() -> TrackingConfig {
    TrackingConfig {
        worker_count: 2,
        retry_base_delay: Duration::from_millis(10),
        ..TrackingConfig::default()
    }
}

/// Start a service over `store`.
#[allow(dead_code)]
pub fn test_service(store: Arc<dyn TrajectoryStore>, config: TrackingConfig) -> Arc<TrajectoryService> {
    Arc::new(TrajectoryService::start(store, config))
}

/// Create a test app over an in-memory store.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    let config = Config::test_default();
    let service = test_service(Arc::new(MemoryStore::new()), fast_config());

    let state = Arc::new(AppState { config, service });
    (create_router(state.clone()), state)
}

/// Create a bearer token for `user_id`.
#[allow(dead_code)]
pub fn create_test_jwt(user_id: &str, signing_key: &[u8]) -> String {
    location_tracker::middleware::auth::create_jwt(user_id, signing_key)
        .expect("Failed to create test JWT")
}

/// A fix near Stanford with the given timestamp.
#[allow(dead_code)]
pub fn point_input(timestamp: i64) -> PointInput {
    PointInput {
        latitude: 37.4275 + timestamp as f64 * 1e-6,
        longitude: -122.1697,
        accuracy: Some(5.0),
        speed: Some(1.5),
        timestamp,
        ..PointInput::default()
    }
}

/// A stored point record for seeding a store directly.
#[allow(dead_code)]
pub fn stored_point(trajectory: &Trajectory, timestamp: i64, created_at: i64) -> LocationPoint {
    LocationPoint::from_input(
        &trajectory.user_id,
        &trajectory.id,
        point_input(timestamp),
        created_at,
    )
}

/// Poll `check` until it returns true or `timeout` elapses.
#[allow(dead_code)]
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// In-memory store whose transactions can be failed or held on demand.
#[allow(dead_code)]
pub struct ControlledStore {
    inner: MemoryStore,
    transaction_calls: AtomicU32,
    entered: AtomicU32,
    /// (calls to let through, calls to fail afterwards)
    plan: Mutex<(u32, u32)>,
    held: std::sync::atomic::AtomicBool,
    gate: Semaphore,
    /// Inserted right after the next point count
    after_count: Mutex<Option<LocationPoint>>,
}

#[allow(dead_code)]
impl ControlledStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            transaction_calls: AtomicU32::new(0),
            entered: AtomicU32::new(0),
            plan: Mutex::new((0, 0)),
            held: std::sync::atomic::AtomicBool::new(false),
            gate: Semaphore::new(0),
            after_count: Mutex::new(None),
        }
    }

    /// Insert `point` just after the next `count_points` call returns its
    /// answer, as a concurrent upload would.
    pub fn insert_after_count(&self, point: LocationPoint) {
        *self.after_count.lock().unwrap() = Some(point);
    }

    /// Let `skip` transactions succeed, then fail the next `count`.
    pub fn fail_transactions(&self, skip: u32, count: u32) {
        *self.plan.lock().unwrap() = (skip, count);
    }

    /// Block every transaction until [`release`](Self::release).
    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.gate.close();
    }

    pub fn transaction_calls(&self) -> u32 {
        self.transaction_calls.load(Ordering::SeqCst)
    }

    /// Transactions currently or previously blocked by [`hold`](Self::hold).
    pub fn blocked(&self) -> u32 {
        self.entered.load(Ordering::SeqCst)
    }

    fn should_fail(&self) -> bool {
        let mut plan = self.plan.lock().unwrap();
        if plan.0 > 0 {
            plan.0 -= 1;
            false
        } else if plan.1 > 0 {
            plan.1 -= 1;
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl TrajectoryStore for ControlledStore {
    async fn create_trajectory(&self, trajectory: &Trajectory) -> StoreResult<()> {
        self.inner.create_trajectory(trajectory).await
    }

    async fn get_trajectory(&self, id: &str) -> StoreResult<Option<Trajectory>> {
        self.inner.get_trajectory(id).await
    }

    async fn update_trajectory(
        &self,
        id: &str,
        changes: &TrajectoryChanges,
    ) -> StoreResult<Option<Trajectory>> {
        self.inner.update_trajectory(id, changes).await
    }

    async fn delete_trajectory(&self, id: &str) -> StoreResult<bool> {
        self.inner.delete_trajectory(id).await
    }

    async fn query_trajectories(&self, filter: &TrajectoryFilter) -> StoreResult<Vec<Trajectory>> {
        self.inner.query_trajectories(filter).await
    }

    async fn count_trajectories(&self, filter: &TrajectoryFilter) -> StoreResult<u64> {
        self.inner.count_trajectories(filter).await
    }

    async fn create_point(&self, point: &LocationPoint) -> StoreResult<()> {
        self.inner.create_point(point).await
    }

    async fn get_point(&self, id: &str) -> StoreResult<Option<LocationPoint>> {
        self.inner.get_point(id).await
    }

    async fn delete_point(&self, id: &str) -> StoreResult<bool> {
        self.inner.delete_point(id).await
    }

    async fn query_points(&self, filter: &PointFilter) -> StoreResult<Vec<LocationPoint>> {
        self.inner.query_points(filter).await
    }

    async fn count_points(&self, filter: &PointFilter) -> StoreResult<u64> {
        let count = self.inner.count_points(filter).await?;
        let late = self.after_count.lock().unwrap().take();
        if let Some(point) = late {
            self.inner.create_point(&point).await?;
        }
        Ok(count)
    }

    async fn transaction(&self, writes: Vec<WriteOp>) -> StoreResult<()> {
        self.transaction_calls.fetch_add(1, Ordering::SeqCst);

        if self.held.load(Ordering::SeqCst) {
            self.entered.fetch_add(1, Ordering::SeqCst);
            // Closed on release; the error just means "go ahead".
            let _ = self.gate.acquire().await;
        }

        if self.should_fail() {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        self.inner.transaction(writes).await
    }
}
