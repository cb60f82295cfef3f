// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Trajectory model for storage and API.

use crate::geodesy::BoundingBox;
use crate::models::stats::TrajectoryStats;
use crate::models::LocationPoint;
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// Stored trajectory record.
///
/// Times are epoch milliseconds; `duration` is whole seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Trajectory {
    /// Opaque ID (also used as document ID)
    pub id: String,
    /// Owner
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    /// When tracking started (epoch ms)
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub start_time: i64,
    /// When tracking stopped (epoch ms), never before `start_time`
    #[cfg_attr(feature = "binding-generation", ts(type = "number | null"))]
    pub end_time: Option<i64>,
    /// Cumulative great-circle distance in meters
    #[serde(default)]
    pub distance: f64,
    /// Seconds between start and end time
    #[serde(default)]
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub duration: i64,
    /// Meters per second
    #[serde(default)]
    pub max_speed: f64,
    /// Meters per second
    #[serde(default)]
    pub avg_speed: f64,
    #[serde(default)]
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub point_count: u64,
    /// Zeroed while `point_count == 0`
    #[serde(default)]
    pub bounds: BoundingBox,
    pub is_active: bool,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub created_at: i64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub updated_at: i64,
}

impl Trajectory {
    /// A freshly started, active trajectory with zero stats.
    pub fn new(
        user_id: &str,
        name: String,
        description: Option<String>,
        start_time: i64,
        now: i64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            name,
            description,
            start_time,
            end_time: None,
            distance: 0.0,
            duration: 0,
            max_speed: 0.0,
            avg_speed: 0.0,
            point_count: 0,
            bounds: BoundingBox::default(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Aggregated statistics currently stored on the record.
    pub fn stats(&self) -> TrajectoryStats {
        TrajectoryStats {
            distance: self.distance,
            max_speed: self.max_speed,
            avg_speed: self.avg_speed,
            point_count: self.point_count,
            bounds: self.bounds,
        }
    }
}

/// Partial update applied to a stored trajectory.
///
/// Only the fields that are `Some` change; `updated_at` is always written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrajectoryChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub end_time: Option<i64>,
    pub duration: Option<i64>,
    pub is_active: Option<bool>,
    pub stats: Option<TrajectoryStats>,
    pub updated_at: i64,
}

impl TrajectoryChanges {
    /// Changes that only write recomputed statistics.
    pub fn stats(stats: TrajectoryStats, now: i64) -> Self {
        Self {
            stats: Some(stats),
            updated_at: now,
            ..Self::default()
        }
    }

    pub fn apply(&self, trajectory: &mut Trajectory) {
        if let Some(name) = &self.name {
            trajectory.name = name.clone();
        }
        if let Some(description) = &self.description {
            trajectory.description = Some(description.clone());
        }
        if let Some(end_time) = self.end_time {
            trajectory.end_time = Some(end_time);
        }
        if let Some(duration) = self.duration {
            trajectory.duration = duration;
        }
        if let Some(is_active) = self.is_active {
            trajectory.is_active = is_active;
        }
        if let Some(stats) = &self.stats {
            trajectory.distance = stats.distance;
            trajectory.max_speed = stats.max_speed;
            trajectory.avg_speed = stats.avg_speed;
            trajectory.point_count = stats.point_count;
            trajectory.bounds = stats.bounds;
        }
        trajectory.updated_at = self.updated_at;
    }

    /// Stored field names written by [`apply`](Self::apply).
    pub fn field_paths(&self) -> Vec<&'static str> {
        let mut paths = Vec::new();
        if self.name.is_some() {
            paths.push("name");
        }
        if self.description.is_some() {
            paths.push("description");
        }
        if self.end_time.is_some() {
            paths.push("end_time");
        }
        if self.duration.is_some() {
            paths.push("duration");
        }
        if self.is_active.is_some() {
            paths.push("is_active");
        }
        if self.stats.is_some() {
            paths.extend(["distance", "max_speed", "avg_speed", "point_count", "bounds"]);
        }
        paths.push("updated_at");
        paths
    }
}

/// Request body for starting a trajectory.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTrajectoryRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    /// Epoch ms
    pub start_time: i64,
}

/// Request body for a partial trajectory update.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateTrajectoryRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub end_time: Option<i64>,
    pub is_active: Option<bool>,
}

/// A trajectory optionally accompanied by its points.
#[derive(Debug, Clone, Serialize)]
pub struct TrajectoryDetail {
    #[serde(flatten)]
    pub trajectory: Trajectory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points: Option<Vec<LocationPoint>>,
}

/// Sort keys accepted when listing trajectories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrajectorySortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    StartTime,
    Name,
    Distance,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

/// Listing filters for a user's trajectories.
#[derive(Debug, Clone, Deserialize)]
pub struct TrajectoryQuery {
    /// Substring match on the name
    pub name: Option<String>,
    pub is_active: Option<bool>,
    /// Only trajectories starting at or after this time (epoch ms)
    pub start_time: Option<i64>,
    /// Only trajectories ending at or before this time (epoch ms)
    pub end_time: Option<i64>,
    #[serde(default)]
    pub order_by: TrajectorySortField,
    #[serde(default)]
    pub order: SortDirection,
    /// Pagination: page number (1-indexed)
    #[serde(default = "default_page")]
    pub page: u32,
    /// Pagination: items per page
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_page() -> u32 {
    1
}
fn default_limit() -> u32 {
    20
}

impl Default for TrajectoryQuery {
    fn default() -> Self {
        Self {
            name: None,
            is_active: None,
            start_time: None,
            end_time: None,
            order_by: TrajectorySortField::default(),
            order: SortDirection::default(),
            page: default_page(),
            limit: default_limit(),
        }
    }
}

/// One page of results plus the total number of matches.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}
