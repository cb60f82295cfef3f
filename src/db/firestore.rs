// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore-backed [`TrajectoryStore`].
//!
//! Documents:
//! - `trajectories/{id}`
//! - `location_points/{id}` (with `trajectory_id` and `user_id` fields)
//!
//! Equality filters go to Firestore; ranges, substring and bounding box
//! filters plus ordering are applied to the fetched set, so composite
//! indexes are not required.

use crate::db::{
    collections, paginate, PointFilter, StoreError, StoreResult, TrajectoryFilter,
    TrajectoryStore, WriteOp,
};
use crate::models::{LocationPoint, Trajectory, TrajectoryChanges};
use async_trait::async_trait;
use firestore::errors::FirestoreError;
use firestore::FirestoreWritePrecondition;
use std::collections::HashSet;

// Firestore limits batch/transaction writes to 500 operations.
// We use a safe limit of 400 to allow headroom.
const BATCH_SIZE: usize = 400;

fn backend(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> StoreResult<Self> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> StoreResult<Self> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            StoreError::Unavailable(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create an offline client; every operation fails with `Unavailable`.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    fn get_client(&self) -> StoreResult<&firestore::FirestoreDb> {
        self.client
            .as_ref()
            .ok_or_else(|| StoreError::Unavailable("Database not connected (offline mode)".into()))
    }

    async fn put_trajectory(&self, trajectory: &Trajectory) -> StoreResult<()> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::TRAJECTORIES)
            .document_id(&trajectory.id)
            .object(trajectory)
            .execute()
            .await
            .map_err(backend)?;
        Ok(())
    }

    /// Fetch points using equality filters only.
    async fn fetch_points(
        &self,
        trajectory_id: Option<&str>,
        user_id: Option<&str>,
    ) -> StoreResult<Vec<LocationPoint>> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::LOCATION_POINTS)
            .filter(|q| {
                q.for_all([
                    trajectory_id.and_then(|id| q.field("trajectory_id").eq(id)),
                    user_id.and_then(|id| q.field("user_id").eq(id)),
                ])
            })
            .obj()
            .query()
            .await
            .map_err(backend)
    }

    async fn matching_trajectories(
        &self,
        filter: &TrajectoryFilter,
    ) -> StoreResult<Vec<Trajectory>> {
        let user_id = filter.user_id.as_deref();
        let is_active = filter.is_active;

        let trajectories: Vec<Trajectory> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::TRAJECTORIES)
            .filter(|q| {
                q.for_all([
                    user_id.and_then(|id| q.field("user_id").eq(id)),
                    is_active.and_then(|active| q.field("is_active").eq(active)),
                ])
            })
            .obj()
            .query()
            .await
            .map_err(backend)?;

        Ok(trajectories
            .into_iter()
            .filter(|t| filter.matches(t))
            .collect())
    }

    async fn matching_points(&self, filter: &PointFilter) -> StoreResult<Vec<LocationPoint>> {
        let points = self
            .fetch_points(filter.trajectory_id.as_deref(), filter.user_id.as_deref())
            .await?;
        Ok(points.into_iter().filter(|p| filter.matches(p)).collect())
    }

    /// Trajectory IDs that exist now, for reference checks before a write.
    async fn existing_trajectories<'a>(
        &self,
        ids: impl Iterator<Item = &'a str>,
    ) -> StoreResult<HashSet<String>> {
        let mut existing = HashSet::new();
        for id in ids.collect::<HashSet<_>>() {
            if self.get_trajectory(id).await?.is_some() {
                existing.insert(id.to_string());
            }
        }
        Ok(existing)
    }

    async fn commit_chunk(&self, chunk: &[DocWrite]) -> StoreResult<()> {
        let client = self.get_client()?;
        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| backend(format!("Failed to begin transaction: {}", e)))?;

        for write in chunk {
            match write {
                DocWrite::Put(point) => {
                    client
                        .fluent()
                        .update()
                        .in_col(collections::LOCATION_POINTS)
                        .document_id(&point.id)
                        .object(point)
                        .add_to_transaction(&mut transaction)
                        .map_err(backend)?;
                }
                DocWrite::Delete(collection, id) => {
                    client
                        .fluent()
                        .delete()
                        .from(*collection)
                        .document_id(id)
                        .add_to_transaction(&mut transaction)
                        .map_err(backend)?;
                }
            }
        }

        transaction
            .commit()
            .await
            .map_err(|e| backend(format!("Transaction commit failed: {}", e)))?;
        Ok(())
    }
}

/// A single document write after cascade expansion.
enum DocWrite {
    Put(LocationPoint),
    Delete(&'static str, String),
}

#[async_trait]
impl TrajectoryStore for FirestoreDb {
    async fn create_trajectory(&self, trajectory: &Trajectory) -> StoreResult<()> {
        self.put_trajectory(trajectory).await
    }

    async fn get_trajectory(&self, id: &str) -> StoreResult<Option<Trajectory>> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::TRAJECTORIES)
            .obj()
            .one(id)
            .await
            .map_err(backend)
    }

    async fn update_trajectory(
        &self,
        id: &str,
        changes: &TrajectoryChanges,
    ) -> StoreResult<Option<Trajectory>> {
        let Some(mut trajectory) = self.get_trajectory(id).await? else {
            return Ok(None);
        };
        changes.apply(&mut trajectory);

        // Write only the changed fields, and only while the document exists.
        let result: Result<Trajectory, FirestoreError> = self
            .get_client()?
            .fluent()
            .update()
            .fields(changes.field_paths())
            .in_col(collections::TRAJECTORIES)
            .precondition(FirestoreWritePrecondition::Exists(true))
            .document_id(id)
            .object(&trajectory)
            .execute()
            .await;

        match result {
            Ok(updated) => Ok(Some(updated)),
            Err(FirestoreError::DataNotFoundError(_)) => Ok(None),
            Err(e) => {
                if self.get_trajectory(id).await?.is_none() {
                    return Ok(None);
                }
                Err(backend(e))
            }
        }
    }

    async fn delete_trajectory(&self, id: &str) -> StoreResult<bool> {
        if self.get_trajectory(id).await?.is_none() {
            return Ok(false);
        }
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::TRAJECTORIES)
            .document_id(id)
            .execute()
            .await
            .map_err(backend)?;
        Ok(true)
    }

    async fn query_trajectories(&self, filter: &TrajectoryFilter) -> StoreResult<Vec<Trajectory>> {
        let mut trajectories = self.matching_trajectories(filter).await?;
        trajectories.sort_by(|a, b| filter.compare(a, b));
        Ok(paginate(trajectories, filter.offset, filter.limit))
    }

    async fn count_trajectories(&self, filter: &TrajectoryFilter) -> StoreResult<u64> {
        Ok(self.matching_trajectories(filter).await?.len() as u64)
    }

    async fn create_point(&self, point: &LocationPoint) -> StoreResult<()> {
        if self.get_trajectory(&point.trajectory_id).await?.is_none() {
            return Err(StoreError::Constraint(format!(
                "trajectory {} does not exist",
                point.trajectory_id
            )));
        }
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::LOCATION_POINTS)
            .document_id(&point.id)
            .object(point)
            .execute()
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn get_point(&self, id: &str) -> StoreResult<Option<LocationPoint>> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::LOCATION_POINTS)
            .obj()
            .one(id)
            .await
            .map_err(backend)
    }

    async fn delete_point(&self, id: &str) -> StoreResult<bool> {
        if self.get_point(id).await?.is_none() {
            return Ok(false);
        }
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::LOCATION_POINTS)
            .document_id(id)
            .execute()
            .await
            .map_err(backend)?;
        Ok(true)
    }

    async fn query_points(&self, filter: &PointFilter) -> StoreResult<Vec<LocationPoint>> {
        let mut points = self.matching_points(filter).await?;
        points.sort_by(PointFilter::compare);
        Ok(paginate(points, filter.offset, filter.limit))
    }

    async fn count_points(&self, filter: &PointFilter) -> StoreResult<u64> {
        Ok(self.matching_points(filter).await?.len() as u64)
    }

    /// Commit `writes` in one Firestore transaction.
    ///
    /// Cascading point deletes can exceed the per-transaction write limit.
    /// In that case point writes are committed in chunks and trajectory
    /// deletes go in the final chunk, so a failure never leaves points
    /// without their trajectory.
    async fn transaction(&self, writes: Vec<WriteOp>) -> StoreResult<()> {
        let inserted = writes.iter().filter_map(|op| match op {
            WriteOp::InsertPoint(point) => Some(point.trajectory_id.as_str()),
            _ => None,
        });
        let mut live = self.existing_trajectories(inserted).await?;

        let mut point_writes = Vec::new();
        let mut trajectory_deletes = Vec::new();
        for op in writes {
            match op {
                WriteOp::InsertPoint(point) => {
                    if !live.contains(&point.trajectory_id) {
                        return Err(StoreError::Constraint(format!(
                            "trajectory {} does not exist",
                            point.trajectory_id
                        )));
                    }
                    point_writes.push(DocWrite::Put(point));
                }
                WriteOp::DeletePoint(id) => {
                    point_writes.push(DocWrite::Delete(collections::LOCATION_POINTS, id));
                }
                WriteOp::DeletePointsOf(trajectory_id) => {
                    for point in self.fetch_points(Some(&trajectory_id), None).await? {
                        point_writes.push(DocWrite::Delete(collections::LOCATION_POINTS, point.id));
                    }
                }
                WriteOp::DeleteTrajectory(id) => {
                    live.remove(&id);
                    trajectory_deletes.push(DocWrite::Delete(collections::TRAJECTORIES, id));
                }
            }
        }

        if point_writes.len() + trajectory_deletes.len() <= BATCH_SIZE {
            point_writes.extend(trajectory_deletes);
            return self.commit_chunk(&point_writes).await;
        }

        tracing::debug!(
            writes = point_writes.len() + trajectory_deletes.len(),
            "Splitting large write set into chunked transactions"
        );
        for chunk in point_writes.chunks(BATCH_SIZE) {
            self.commit_chunk(chunk).await?;
        }
        for chunk in trajectory_deletes.chunks(BATCH_SIZE) {
            self.commit_chunk(chunk).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_offline_client_reports_unavailable() {
        let db = FirestoreDb::new_mock();
        let err = db.get_trajectory("any").await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(err.is_transient());
    }
}
