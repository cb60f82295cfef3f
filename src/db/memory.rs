// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process store used for local development and tests.

use crate::db::{
    paginate, PointFilter, StoreError, StoreResult, TrajectoryFilter, TrajectoryStore, WriteOp,
};
use crate::models::{LocationPoint, Trajectory, TrajectoryChanges};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    trajectories: HashMap<String, Trajectory>,
    points: HashMap<String, LocationPoint>,
}

impl Tables {
    fn insert_point(&mut self, point: &LocationPoint) -> StoreResult<()> {
        if !self.trajectories.contains_key(&point.trajectory_id) {
            return Err(StoreError::Constraint(format!(
                "trajectory {} does not exist",
                point.trajectory_id
            )));
        }
        self.points.insert(point.id.clone(), point.clone());
        Ok(())
    }

    /// Run `op` against this state, reporting errors before anything is lost.
    fn apply(&mut self, op: &WriteOp) -> StoreResult<()> {
        match op {
            WriteOp::InsertPoint(point) => self.insert_point(point)?,
            WriteOp::DeletePoint(id) => {
                self.points.remove(id);
            }
            WriteOp::DeletePointsOf(trajectory_id) => {
                self.points.retain(|_, p| &p.trajectory_id != trajectory_id);
            }
            WriteOp::DeleteTrajectory(id) => {
                self.trajectories.remove(id);
            }
        }
        Ok(())
    }
}

/// [`TrajectoryStore`] backed by hash maps behind an async lock.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TrajectoryStore for MemoryStore {
    async fn create_trajectory(&self, trajectory: &Trajectory) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.trajectories.contains_key(&trajectory.id) {
            return Err(StoreError::Constraint(format!(
                "trajectory {} already exists",
                trajectory.id
            )));
        }
        tables
            .trajectories
            .insert(trajectory.id.clone(), trajectory.clone());
        Ok(())
    }

    async fn get_trajectory(&self, id: &str) -> StoreResult<Option<Trajectory>> {
        Ok(self.tables.read().await.trajectories.get(id).cloned())
    }

    async fn update_trajectory(
        &self,
        id: &str,
        changes: &TrajectoryChanges,
    ) -> StoreResult<Option<Trajectory>> {
        let mut tables = self.tables.write().await;
        Ok(tables.trajectories.get_mut(id).map(|trajectory| {
            changes.apply(trajectory);
            trajectory.clone()
        }))
    }

    async fn delete_trajectory(&self, id: &str) -> StoreResult<bool> {
        Ok(self.tables.write().await.trajectories.remove(id).is_some())
    }

    async fn query_trajectories(&self, filter: &TrajectoryFilter) -> StoreResult<Vec<Trajectory>> {
        let tables = self.tables.read().await;
        let mut matches: Vec<Trajectory> = tables
            .trajectories
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        matches.sort_by(|a, b| filter.compare(a, b));
        Ok(paginate(matches, filter.offset, filter.limit))
    }

    async fn count_trajectories(&self, filter: &TrajectoryFilter) -> StoreResult<u64> {
        let tables = self.tables.read().await;
        Ok(tables
            .trajectories
            .values()
            .filter(|t| filter.matches(t))
            .count() as u64)
    }

    async fn create_point(&self, point: &LocationPoint) -> StoreResult<()> {
        self.tables.write().await.insert_point(point)
    }

    async fn get_point(&self, id: &str) -> StoreResult<Option<LocationPoint>> {
        Ok(self.tables.read().await.points.get(id).cloned())
    }

    async fn delete_point(&self, id: &str) -> StoreResult<bool> {
        Ok(self.tables.write().await.points.remove(id).is_some())
    }

    async fn query_points(&self, filter: &PointFilter) -> StoreResult<Vec<LocationPoint>> {
        let tables = self.tables.read().await;
        let mut matches: Vec<LocationPoint> = tables
            .points
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        matches.sort_by(PointFilter::compare);
        Ok(paginate(matches, filter.offset, filter.limit))
    }

    async fn count_points(&self, filter: &PointFilter) -> StoreResult<u64> {
        let tables = self.tables.read().await;
        Ok(tables.points.values().filter(|p| filter.matches(p)).count() as u64)
    }

    async fn transaction(&self, writes: Vec<WriteOp>) -> StoreResult<()> {
        let mut tables = self.tables.write().await;

        // Validate the whole batch against a scratch view of the trajectory
        // table before touching anything.
        let mut live: std::collections::HashSet<&str> =
            tables.trajectories.keys().map(String::as_str).collect();
        for op in &writes {
            match op {
                WriteOp::InsertPoint(point) if !live.contains(point.trajectory_id.as_str()) => {
                    return Err(StoreError::Constraint(format!(
                        "trajectory {} does not exist",
                        point.trajectory_id
                    )));
                }
                WriteOp::DeleteTrajectory(id) => {
                    live.remove(id.as_str());
                }
                _ => {}
            }
        }

        for op in &writes {
            tables.apply(op)?;
        }
        Ok(())
    }
}
