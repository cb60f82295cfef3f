// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Trajectory lifecycle: creation, ingestion, updates, deletion,
//! client sync and retention cleanup.
//!
//! Every operation takes the authenticated owner ID and treats a
//! trajectory owned by somebody else exactly like a missing one.

use crate::config::TrackingConfig;
use crate::db::{PointFilter, TrajectoryFilter, TrajectoryStore, WriteOp};
use crate::error::{AppError, Result};
use crate::models::{
    AddPointRequest, BatchAccepted, BatchPointsRequest, CreateTrajectoryRequest, LocationPoint,
    Page, PointQuery, SortDirection, SyncRequest, SyncResponse, SyncStatus, Trajectory,
    TrajectoryChanges, TrajectoryDetail, TrajectoryQuery, TrajectorySortField,
    UpdateTrajectoryRequest, UserTrajectoryStats,
};
use crate::services::aggregator::{AggregationScheduler, TrajectoryAggregator};
use crate::services::cleanup::CleanupReport;
use crate::services::upload_pool::{UploadTask, UploadWorkerPool};
use crate::time_utils::{days_ago_millis, elapsed_seconds, format_millis_rfc3339, now_millis};
use futures_util::{stream, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use validator::Validate;

const MAX_CONCURRENT_DB_OPS: usize = 50;
const MAX_PAGE_SIZE: u32 = 100;
const DEFAULT_POINT_LIMIT: u32 = 100;
const MAX_POINT_LIMIT: u32 = 1000;
// Point deletes per cleanup transaction.
const CLEANUP_CHUNK_SIZE: usize = 400;

/// Owns every trajectory state transition.
pub struct TrajectoryService {
    store: Arc<dyn TrajectoryStore>,
    config: TrackingConfig,
    scheduler: Arc<AggregationScheduler>,
    pool: UploadWorkerPool,
}

impl TrajectoryService {
    /// Start the aggregation scheduler and the upload pool over `store`.
    pub fn start(store: Arc<dyn TrajectoryStore>, config: TrackingConfig) -> Self {
        let scheduler = Arc::new(AggregationScheduler::start(
            TrajectoryAggregator::new(store.clone()),
            config.aggregation_queue_capacity,
        ));
        let pool = UploadWorkerPool::start(store.clone(), scheduler.clone(), &config);

        Self {
            store,
            config,
            scheduler,
            pool,
        }
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    pub fn pool(&self) -> &UploadWorkerPool {
        &self.pool
    }

    /// Stop the upload pool, then drain pending aggregations.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
        self.scheduler.shutdown().await;
        tracing::info!("Trajectory service stopped");
    }

    /// Load a trajectory, hiding ones owned by other users.
    async fn owned_trajectory(&self, user_id: &str, trajectory_id: &str) -> Result<Trajectory> {
        match self.store.get_trajectory(trajectory_id).await? {
            Some(trajectory) if trajectory.user_id == user_id => Ok(trajectory),
            _ => Err(AppError::trajectory_not_found()),
        }
    }

    // ─── Trajectories ────────────────────────────────────────────

    pub async fn create_trajectory(
        &self,
        user_id: &str,
        request: CreateTrajectoryRequest,
    ) -> Result<Trajectory> {
        request.validate()?;
        if request.name.trim().is_empty() {
            return Err(AppError::validation("name", "must not be blank"));
        }
        if request.start_time <= 0 {
            return Err(AppError::validation("start_time", "must be positive"));
        }

        let owned = self
            .store
            .count_trajectories(&TrajectoryFilter::for_user(user_id))
            .await?;
        if owned >= self.config.max_trajectories_per_user {
            return Err(AppError::LimitExceeded(format!(
                "at most {} trajectories per user",
                self.config.max_trajectories_per_user
            )));
        }

        let trajectory = Trajectory::new(
            user_id,
            request.name,
            request.description,
            request.start_time,
            now_millis(),
        );
        self.store.create_trajectory(&trajectory).await?;

        tracing::info!(
            user_id,
            trajectory_id = %trajectory.id,
            "Trajectory created"
        );
        Ok(trajectory)
    }

    pub async fn get_trajectory(
        &self,
        user_id: &str,
        trajectory_id: &str,
        include_points: bool,
    ) -> Result<TrajectoryDetail> {
        let trajectory = self.owned_trajectory(user_id, trajectory_id).await?;

        let points = if include_points {
            Some(
                self.store
                    .query_points(&PointFilter::for_trajectory(trajectory_id))
                    .await?,
            )
        } else {
            None
        };

        Ok(TrajectoryDetail { trajectory, points })
    }

    pub async fn list_trajectories(
        &self,
        user_id: &str,
        query: &TrajectoryQuery,
    ) -> Result<Page<Trajectory>> {
        let limit = query.limit.clamp(1, MAX_PAGE_SIZE);
        let offset = query.page.max(1).saturating_sub(1).saturating_mul(limit);

        let mut filter = trajectory_filter(user_id, query);
        let total = self.store.count_trajectories(&filter).await?;

        filter.limit = Some(limit as usize);
        filter.offset = offset as usize;
        let data = self.store.query_trajectories(&filter).await?;

        Ok(Page {
            data,
            total,
            limit,
            offset,
        })
    }

    /// Apply a partial update.
    ///
    /// Deactivating without an end time closes the trajectory at the
    /// current time.
    pub async fn update_trajectory(
        &self,
        user_id: &str,
        trajectory_id: &str,
        request: UpdateTrajectoryRequest,
    ) -> Result<Trajectory> {
        request.validate()?;
        let existing = self.owned_trajectory(user_id, trajectory_id).await?;
        let now = now_millis();

        let mut changes = TrajectoryChanges {
            name: request.name,
            description: request.description,
            is_active: request.is_active,
            updated_at: now,
            ..TrajectoryChanges::default()
        };

        let end_time = match request.end_time {
            Some(end_time) if end_time < existing.start_time => {
                return Err(AppError::validation(
                    "end_time",
                    "must not be before start_time",
                ));
            }
            Some(end_time) => Some(end_time),
            None if request.is_active == Some(false) && existing.end_time.is_none() => {
                Some(now.max(existing.start_time))
            }
            None => None,
        };
        if let Some(end_time) = end_time {
            changes.end_time = Some(end_time);
            changes.duration = Some(elapsed_seconds(existing.start_time, end_time));
        }

        let updated = self
            .store
            .update_trajectory(trajectory_id, &changes)
            .await?
            .ok_or_else(AppError::trajectory_not_found)?;

        tracing::info!(
            user_id,
            trajectory_id,
            is_active = updated.is_active,
            "Trajectory updated"
        );
        Ok(updated)
    }

    /// Stop tracking: mark inactive and close at the current time.
    pub async fn finish_trajectory(&self, user_id: &str, trajectory_id: &str) -> Result<Trajectory> {
        self.update_trajectory(
            user_id,
            trajectory_id,
            UpdateTrajectoryRequest {
                is_active: Some(false),
                ..UpdateTrajectoryRequest::default()
            },
        )
        .await
    }

    /// Delete a trajectory and all its points atomically.
    pub async fn delete_trajectory(&self, user_id: &str, trajectory_id: &str) -> Result<()> {
        self.owned_trajectory(user_id, trajectory_id).await?;

        self.store
            .transaction(vec![
                WriteOp::DeletePointsOf(trajectory_id.to_string()),
                WriteOp::DeleteTrajectory(trajectory_id.to_string()),
            ])
            .await?;

        tracing::info!(user_id, trajectory_id, "Trajectory deleted");
        Ok(())
    }

    /// Summary over the user's trajectories matching `query` (paging ignored).
    pub async fn get_user_stats(
        &self,
        user_id: &str,
        query: &TrajectoryQuery,
    ) -> Result<UserTrajectoryStats> {
        let trajectories = self
            .store
            .query_trajectories(&trajectory_filter(user_id, query))
            .await?;
        Ok(UserTrajectoryStats::from_trajectories(&trajectories))
    }

    // ─── Points ──────────────────────────────────────────────────

    /// Insert one point synchronously; stats follow asynchronously.
    pub async fn add_point(&self, user_id: &str, request: AddPointRequest) -> Result<LocationPoint> {
        if request.trajectory_id.trim().is_empty() {
            return Err(AppError::validation("trajectory_id", "must not be empty"));
        }
        let trajectory = self.owned_trajectory(user_id, &request.trajectory_id).await?;

        let point =
            LocationPoint::from_input(user_id, &request.trajectory_id, request.point, now_millis());
        point.validate()?;

        if trajectory.point_count >= self.config.max_points_per_trajectory {
            return Err(AppError::LimitExceeded(format!(
                "at most {} points per trajectory",
                self.config.max_points_per_trajectory
            )));
        }

        self.store.create_point(&point).await?;
        self.scheduler.schedule(&point.trajectory_id);

        tracing::debug!(
            trajectory_id = %point.trajectory_id,
            point_id = %point.id,
            "Point added"
        );
        Ok(point)
    }

    /// Validate a bulk upload and hand it to the worker pool.
    ///
    /// Acceptance does not guarantee persistence: the pool retries
    /// transient failures and then gives up.
    pub async fn add_points_batch(
        &self,
        user_id: &str,
        trajectory_id: &str,
        request: BatchPointsRequest,
    ) -> Result<BatchAccepted> {
        let count = request.points.len();
        if count == 0 {
            return Err(AppError::validation("points", "must not be empty"));
        }
        if count > self.config.max_batch_points {
            return Err(AppError::validation(
                "points",
                format!(
                    "{} points exceeds the maximum of {} per batch",
                    count, self.config.max_batch_points
                ),
            ));
        }

        let trajectory = self.owned_trajectory(user_id, trajectory_id).await?;
        if trajectory.point_count + count as u64 > self.config.max_points_per_trajectory {
            return Err(AppError::LimitExceeded(format!(
                "at most {} points per trajectory",
                self.config.max_points_per_trajectory
            )));
        }

        let now = now_millis();
        let mut points = Vec::with_capacity(count);
        for (index, input) in request.points.into_iter().enumerate() {
            let point = LocationPoint::from_input(user_id, trajectory_id, input, now);
            point.validate_in_batch(index)?;
            points.push(point);
        }

        self.pool
            .submit(UploadTask::new(user_id, trajectory_id, points))?;

        tracing::info!(user_id, trajectory_id, count, "Batch accepted");
        Ok(BatchAccepted {
            accepted: true,
            trajectory_id: trajectory_id.to_string(),
            point_count: count as u32,
        })
    }

    /// The user's points, ordered by timestamp ascending.
    pub async fn get_points(&self, user_id: &str, query: &PointQuery) -> Result<Page<LocationPoint>> {
        if let Some(trajectory_id) = &query.trajectory_id {
            self.owned_trajectory(user_id, trajectory_id).await?;
        }

        let limit = query
            .limit
            .unwrap_or(DEFAULT_POINT_LIMIT)
            .clamp(1, MAX_POINT_LIMIT);
        let offset = query.offset.unwrap_or(0);

        let mut filter = PointFilter {
            trajectory_id: query.trajectory_id.clone(),
            user_id: Some(user_id.to_string()),
            time_from: query.start_time,
            time_until: query.end_time,
            bounds: query.bounds(),
            ..PointFilter::default()
        };
        let total = self.store.count_points(&filter).await?;

        filter.limit = Some(limit as usize);
        filter.offset = offset as usize;
        let data = self.store.query_points(&filter).await?;

        Ok(Page {
            data,
            total,
            limit,
            offset,
        })
    }

    pub async fn delete_point(&self, user_id: &str, point_id: &str) -> Result<()> {
        let not_found = || AppError::NotFound("point not found".to_string());

        let point = self.store.get_point(point_id).await?.ok_or_else(not_found)?;
        if point.user_id != user_id {
            return Err(not_found());
        }
        self.owned_trajectory(user_id, &point.trajectory_id)
            .await
            .map_err(|_| not_found())?;

        if !self.store.delete_point(point_id).await? {
            return Err(not_found());
        }
        self.scheduler.schedule(&point.trajectory_id);

        tracing::debug!(
            trajectory_id = %point.trajectory_id,
            point_id,
            "Point deleted"
        );
        Ok(())
    }

    // ─── Sync ────────────────────────────────────────────────────

    /// Three-way diff of the user's trajectories against `last_sync_time`.
    pub async fn sync_data(&self, user_id: &str, request: SyncRequest) -> Result<SyncResponse> {
        let sync_time = now_millis();
        let since = request.last_sync_time;

        let new_trajectories = self
            .store
            .query_trajectories(&TrajectoryFilter {
                created_after: Some(since),
                sort: TrajectorySortField::CreatedAt,
                direction: SortDirection::Asc,
                ..TrajectoryFilter::for_user(user_id)
            })
            .await?;

        let updated_trajectories = self
            .store
            .query_trajectories(&TrajectoryFilter {
                updated_after: Some(since),
                created_until: Some(since),
                sort: TrajectorySortField::UpdatedAt,
                direction: SortDirection::Asc,
                ..TrajectoryFilter::for_user(user_id)
            })
            .await?;

        let store = &self.store;
        let lookups: Vec<Result<(String, bool)>> = stream::iter(request.trajectory_ids)
            .map(|id| async move {
                let present = matches!(
                    store.get_trajectory(&id).await?,
                    Some(t) if t.user_id == user_id
                );
                Ok::<_, AppError>((id, present))
            })
            .buffered(MAX_CONCURRENT_DB_OPS)
            .collect()
            .await;

        let mut seen = HashSet::new();
        let mut deleted_trajectory_ids = Vec::new();
        for lookup in lookups {
            let (id, present) = lookup?;
            if !present && seen.insert(id.clone()) {
                deleted_trajectory_ids.push(id);
            }
        }

        tracing::debug!(
            user_id,
            new = new_trajectories.len(),
            updated = updated_trajectories.len(),
            deleted = deleted_trajectory_ids.len(),
            "Sync computed"
        );

        Ok(SyncResponse {
            new_trajectories,
            updated_trajectories,
            deleted_trajectory_ids,
            sync_time,
        })
    }

    pub fn sync_status(&self, user_id: &str) -> SyncStatus {
        SyncStatus {
            user_id: user_id.to_string(),
            pending_uploads: self.pool.pending(),
            pending_aggregations: self.scheduler.pending(),
            server_time: now_millis(),
            uploads: self.pool.metrics(),
        }
    }

    // ─── Retention ───────────────────────────────────────────────

    /// Delete points older than the retention window, then the old
    /// trajectories left without points.
    ///
    /// `retention_days == 0` uses the configured retention.
    pub async fn cleanup_expired_data(&self, retention_days: u32) -> Result<CleanupReport> {
        let retention_days = if retention_days == 0 {
            self.config.retention_days
        } else {
            retention_days
        };
        let cutoff = days_ago_millis(retention_days);

        let expired = self
            .store
            .query_points(&PointFilter {
                created_before: Some(cutoff),
                ..PointFilter::default()
            })
            .await?;

        let mut touched: HashSet<String> = HashSet::new();
        let mut points_deleted = 0u64;
        for chunk in expired.chunks(CLEANUP_CHUNK_SIZE) {
            let writes = chunk
                .iter()
                .map(|point| WriteOp::DeletePoint(point.id.clone()))
                .collect();
            self.store.transaction(writes).await?;

            points_deleted += chunk.len() as u64;
            touched.extend(chunk.iter().map(|point| point.trajectory_id.clone()));
        }

        let stale = self
            .store
            .query_trajectories(&TrajectoryFilter {
                created_until: Some(cutoff - 1),
                ..TrajectoryFilter::default()
            })
            .await?;

        let mut trajectories_deleted = 0u64;
        for trajectory in stale {
            let remaining = self
                .store
                .count_points(&PointFilter::for_trajectory(&trajectory.id))
                .await?;
            if remaining > 0 {
                continue;
            }
            // Points uploaded after the count go with the trajectory.
            self.store
                .transaction(vec![
                    WriteOp::DeletePointsOf(trajectory.id.clone()),
                    WriteOp::DeleteTrajectory(trajectory.id.clone()),
                ])
                .await?;
            trajectories_deleted += 1;
            touched.remove(&trajectory.id);
        }

        for trajectory_id in &touched {
            self.scheduler.schedule(trajectory_id);
        }

        let report = CleanupReport {
            retention_days,
            cutoff,
            points_deleted,
            trajectories_deleted,
        };
        tracing::info!(
            retention_days,
            cutoff = format_millis_rfc3339(cutoff).as_deref().unwrap_or("invalid"),
            points_deleted,
            trajectories_deleted,
            "Expired data cleanup complete"
        );
        Ok(report)
    }
}

/// Storage filter for the non-paging parts of a listing query.
fn trajectory_filter(user_id: &str, query: &TrajectoryQuery) -> TrajectoryFilter {
    TrajectoryFilter {
        name_contains: query.name.clone().filter(|name| !name.is_empty()),
        is_active: query.is_active,
        start_from: query.start_time,
        end_until: query.end_time,
        sort: query.order_by,
        direction: query.order,
        ..TrajectoryFilter::for_user(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::PointInput;

    fn service() -> TrajectoryService {
        TrajectoryService::start(Arc::new(MemoryStore::new()), TrackingConfig::default())
    }

    fn create_request(name: &str) -> CreateTrajectoryRequest {
        CreateTrajectoryRequest {
            name: name.to_string(),
            description: None,
            start_time: 1_000,
        }
    }

    #[tokio::test]
    async fn test_other_users_trajectory_is_not_found() {
        let service = service();
        let trajectory = service
            .create_trajectory("alice", create_request("Walk"))
            .await
            .unwrap();

        let err = service
            .get_trajectory("bob", &trajectory.id, false)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_deactivating_sets_end_time_and_duration() {
        let service = service();
        let trajectory = service
            .create_trajectory("alice", create_request("Walk"))
            .await
            .unwrap();

        let finished = service
            .finish_trajectory("alice", &trajectory.id)
            .await
            .unwrap();

        assert!(!finished.is_active);
        let end_time = finished.end_time.unwrap();
        assert!(end_time >= trajectory.start_time);
        assert_eq!(
            finished.duration,
            elapsed_seconds(trajectory.start_time, end_time)
        );

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_explicit_end_time_before_start_is_rejected() {
        let service = service();
        let trajectory = service
            .create_trajectory("alice", create_request("Walk"))
            .await
            .unwrap();

        let err = service
            .update_trajectory(
                "alice",
                &trajectory.id,
                UpdateTrajectoryRequest {
                    end_time: Some(999),
                    ..UpdateTrajectoryRequest::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "end_time"));

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_batch_reports_index_of_invalid_point() {
        let service = service();
        let trajectory = service
            .create_trajectory("alice", create_request("Walk"))
            .await
            .unwrap();

        let mut points = vec![
            PointInput {
                latitude: 1.0,
                longitude: 1.0,
                timestamp: 1,
                ..PointInput::default()
            };
            4
        ];
        points[2].speed = Some(-1.0);

        let err = service
            .add_points_batch("alice", &trajectory.id, BatchPointsRequest { points })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "points[2].speed"));
        assert_eq!(service.pool().metrics().submitted, 0);

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_trajectory_limit_per_user() {
        let config = TrackingConfig {
            max_trajectories_per_user: 2,
            ..TrackingConfig::default()
        };
        let service = TrajectoryService::start(Arc::new(MemoryStore::new()), config);

        for name in ["a", "b"] {
            service
                .create_trajectory("alice", create_request(name))
                .await
                .unwrap();
        }
        let err = service
            .create_trajectory("alice", create_request("c"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::LimitExceeded(_)));

        // Other users are unaffected.
        assert!(service
            .create_trajectory("bob", create_request("a"))
            .await
            .is_ok());

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_list_clamps_page_size() {
        let service = service();
        let page = service
            .list_trajectories(
                "alice",
                &TrajectoryQuery {
                    limit: 500,
                    page: 0,
                    ..TrajectoryQuery::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(page.limit, MAX_PAGE_SIZE);
        assert_eq!(page.offset, 0);
        assert_eq!(page.total, 0);

        service.shutdown().await;
    }
}
