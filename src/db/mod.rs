//! Persistence layer.
//!
//! [`TrajectoryStore`] is the storage collaborator the services talk to.
//! Two backends implement it: [`MemoryStore`] (development and tests) and
//! [`FirestoreDb`] (Google Cloud Firestore).

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use crate::geodesy::BoundingBox;
use crate::models::{
    LocationPoint, SortDirection, Trajectory, TrajectoryChanges, TrajectorySortField,
};
use async_trait::async_trait;
use std::cmp::Ordering;

/// Collection names as constants.
pub mod collections {
    pub const TRAJECTORIES: &str = "trajectories";
    pub const LOCATION_POINTS: &str = "location_points";
}

/// Storage failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Backend temporarily unreachable; the operation may be retried.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The write would break an integrity rule (e.g. a dangling reference).
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// Error reported by the database driver.
    #[error("database error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        !matches!(self, StoreError::Constraint(_))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// One write inside an all-or-nothing [`TrajectoryStore::transaction`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    InsertPoint(LocationPoint),
    DeletePoint(String),
    /// Delete every point that references the trajectory.
    DeletePointsOf(String),
    DeleteTrajectory(String),
}

/// Trajectory selection, ordering and pagination.
#[derive(Debug, Clone, Default)]
pub struct TrajectoryFilter {
    pub user_id: Option<String>,
    /// Case-sensitive substring of the name
    pub name_contains: Option<String>,
    pub is_active: Option<bool>,
    /// `start_time >= start_from`
    pub start_from: Option<i64>,
    /// `end_time <= end_until`; open trajectories never match
    pub end_until: Option<i64>,
    /// `created_at > created_after`
    pub created_after: Option<i64>,
    /// `created_at <= created_until`
    pub created_until: Option<i64>,
    /// `updated_at > updated_after`
    pub updated_after: Option<i64>,
    pub sort: TrajectorySortField,
    pub direction: SortDirection,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl TrajectoryFilter {
    pub fn for_user(user_id: &str) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            ..Self::default()
        }
    }

    /// Filters that can be evaluated against a record (ignores paging).
    pub fn matches(&self, t: &Trajectory) -> bool {
        if let Some(user_id) = &self.user_id {
            if &t.user_id != user_id {
                return false;
            }
        }
        if let Some(name) = &self.name_contains {
            if !t.name.contains(name.as_str()) {
                return false;
            }
        }
        if let Some(is_active) = self.is_active {
            if t.is_active != is_active {
                return false;
            }
        }
        if let Some(start_from) = self.start_from {
            if t.start_time < start_from {
                return false;
            }
        }
        if let Some(end_until) = self.end_until {
            match t.end_time {
                Some(end) if end <= end_until => {}
                _ => return false,
            }
        }
        if let Some(after) = self.created_after {
            if t.created_at <= after {
                return false;
            }
        }
        if let Some(until) = self.created_until {
            if t.created_at > until {
                return false;
            }
        }
        if let Some(after) = self.updated_after {
            if t.updated_at <= after {
                return false;
            }
        }
        true
    }

    /// Ordering for the configured sort key; ties break on ID.
    pub fn compare(&self, a: &Trajectory, b: &Trajectory) -> Ordering {
        let ordering = match self.sort {
            TrajectorySortField::CreatedAt => a.created_at.cmp(&b.created_at),
            TrajectorySortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            TrajectorySortField::StartTime => a.start_time.cmp(&b.start_time),
            TrajectorySortField::Name => a.name.cmp(&b.name),
            TrajectorySortField::Distance => a.distance.total_cmp(&b.distance),
        }
        .then_with(|| a.id.cmp(&b.id));

        match self.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

/// Point selection and pagination. Results are ordered by timestamp ascending.
#[derive(Debug, Clone, Default)]
pub struct PointFilter {
    pub trajectory_id: Option<String>,
    pub user_id: Option<String>,
    /// `timestamp >= time_from`
    pub time_from: Option<i64>,
    /// `timestamp <= time_until`
    pub time_until: Option<i64>,
    pub bounds: Option<BoundingBox>,
    /// `created_at < created_before`
    pub created_before: Option<i64>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl PointFilter {
    pub fn for_trajectory(trajectory_id: &str) -> Self {
        Self {
            trajectory_id: Some(trajectory_id.to_string()),
            ..Self::default()
        }
    }

    pub fn matches(&self, p: &LocationPoint) -> bool {
        if let Some(trajectory_id) = &self.trajectory_id {
            if &p.trajectory_id != trajectory_id {
                return false;
            }
        }
        if let Some(user_id) = &self.user_id {
            if &p.user_id != user_id {
                return false;
            }
        }
        if let Some(from) = self.time_from {
            if p.timestamp < from {
                return false;
            }
        }
        if let Some(until) = self.time_until {
            if p.timestamp > until {
                return false;
            }
        }
        if let Some(bounds) = &self.bounds {
            if !bounds.contains(p.latitude, p.longitude) {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if p.created_at >= before {
                return false;
            }
        }
        true
    }

    /// Timestamp ascending, then insertion time, then ID.
    pub fn compare(a: &LocationPoint, b: &LocationPoint) -> Ordering {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    }
}

/// Apply offset and limit to an already ordered result set.
pub(crate) fn paginate<T>(items: Vec<T>, offset: usize, limit: Option<usize>) -> Vec<T> {
    let iter = items.into_iter().skip(offset);
    match limit {
        Some(limit) => iter.take(limit).collect(),
        None => iter.collect(),
    }
}

/// Storage collaborator for trajectories and their points.
///
/// Implementations must be safe to share between the upload workers.
#[async_trait]
pub trait TrajectoryStore: Send + Sync {
    async fn create_trajectory(&self, trajectory: &Trajectory) -> StoreResult<()>;

    async fn get_trajectory(&self, id: &str) -> StoreResult<Option<Trajectory>>;

    /// Apply a partial update; `None` when the trajectory does not exist.
    async fn update_trajectory(
        &self,
        id: &str,
        changes: &TrajectoryChanges,
    ) -> StoreResult<Option<Trajectory>>;

    /// Delete one trajectory record. Returns whether it existed.
    async fn delete_trajectory(&self, id: &str) -> StoreResult<bool>;

    async fn query_trajectories(&self, filter: &TrajectoryFilter) -> StoreResult<Vec<Trajectory>>;

    /// Number of matches, ignoring `limit` and `offset`.
    async fn count_trajectories(&self, filter: &TrajectoryFilter) -> StoreResult<u64>;

    /// Insert one point. Fails with `Constraint` if its trajectory is missing.
    async fn create_point(&self, point: &LocationPoint) -> StoreResult<()>;

    async fn get_point(&self, id: &str) -> StoreResult<Option<LocationPoint>>;

    async fn delete_point(&self, id: &str) -> StoreResult<bool>;

    async fn query_points(&self, filter: &PointFilter) -> StoreResult<Vec<LocationPoint>>;

    /// Number of matches, ignoring `limit` and `offset`.
    async fn count_points(&self, filter: &PointFilter) -> StoreResult<u64>;

    /// Apply all writes or none of them.
    async fn transaction(&self, writes: Vec<WriteOp>) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trajectory(id: &str, created_at: i64, name: &str) -> Trajectory {
        let mut t = Trajectory::new("user-1", name.to_string(), None, 0, created_at);
        t.id = id.to_string();
        t
    }

    #[test]
    fn test_default_sort_is_created_at_descending() {
        let filter = TrajectoryFilter::default();
        let mut items = vec![
            trajectory("a", 1, "x"),
            trajectory("b", 3, "y"),
            trajectory("c", 2, "z"),
        ];
        items.sort_by(|a, b| filter.compare(a, b));

        let ids: Vec<&str> = items.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_end_until_skips_open_trajectories() {
        let filter = TrajectoryFilter {
            end_until: Some(100),
            ..TrajectoryFilter::default()
        };
        let mut t = trajectory("a", 1, "x");
        assert!(!filter.matches(&t));

        t.end_time = Some(100);
        assert!(filter.matches(&t));
    }

    #[test]
    fn test_paginate() {
        let items: Vec<u32> = (0..10).collect();
        assert_eq!(paginate(items.clone(), 8, Some(5)), vec![8, 9]);
        assert_eq!(paginate(items.clone(), 0, Some(3)), vec![0, 1, 2]);
        assert_eq!(paginate(items, 12, None), Vec::<u32>::new());
    }

    #[test]
    fn test_constraint_errors_are_permanent() {
        assert!(!StoreError::Constraint("x".into()).is_transient());
        assert!(StoreError::Unavailable("x".into()).is_transient());
        assert!(StoreError::Backend("x".into()).is_transient());
    }
}
