//! Trajectory statistics.
//!
//! [`TrajectoryStats`] is the per-trajectory summary recomputed from the
//! ordered point stream after every ingestion; [`UserTrajectoryStats`] rolls
//! the stored trajectories of one user up for the dashboard.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::geodesy::{distance_meters, expand_bounding_box, BoundingBox};
use crate::models::{LocationPoint, Trajectory};

/// Summary of one trajectory's point set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryStats {
    /// Sum of great-circle distances between consecutive points (meters)
    pub distance: f64,
    /// Largest device-reported speed (m/s)
    pub max_speed: f64,
    /// Mean over points that carry a speed reading (m/s)
    pub avg_speed: f64,
    pub point_count: u64,
    pub bounds: BoundingBox,
}

impl TrajectoryStats {
    /// Compute stats over points ordered by timestamp.
    ///
    /// An empty slice yields all-zero stats.
    pub fn from_points(points: &[LocationPoint]) -> Self {
        let mut accumulator = StatsAccumulator::default();
        for point in points {
            accumulator.push(point);
        }
        accumulator.finish()
    }
}

/// Incremental form of [`TrajectoryStats::from_points`].
///
/// Pushing points one by one in timestamp order gives exactly the same
/// result as the full recomputation.
#[derive(Debug, Clone, Default)]
pub struct StatsAccumulator {
    distance: f64,
    max_speed: f64,
    speed_sum: f64,
    speed_count: u64,
    point_count: u64,
    bounds: Option<BoundingBox>,
    previous: Option<(f64, f64, bool)>,
}

impl StatsAccumulator {
    pub fn push(&mut self, point: &LocationPoint) {
        let valid = point.has_valid_coordinates();

        // Malformed points contribute nothing to distance or bounds.
        if let Some((prev_lat, prev_lon, prev_valid)) = self.previous {
            if prev_valid && valid {
                self.distance +=
                    distance_meters(prev_lat, prev_lon, point.latitude, point.longitude);
            }
        }
        if valid {
            self.bounds = Some(expand_bounding_box(
                self.bounds,
                point.latitude,
                point.longitude,
            ));
        }

        if let Some(speed) = point.speed {
            if speed > self.max_speed {
                self.max_speed = speed;
            }
            self.speed_sum += speed;
            self.speed_count += 1;
        }

        self.point_count += 1;
        self.previous = Some((point.latitude, point.longitude, valid));
    }

    pub fn finish(&self) -> TrajectoryStats {
        let avg_speed = if self.speed_count > 0 {
            self.speed_sum / self.speed_count as f64
        } else {
            0.0
        };

        TrajectoryStats {
            distance: self.distance,
            max_speed: self.max_speed,
            avg_speed,
            point_count: self.point_count,
            bounds: self.bounds.unwrap_or_default(),
        }
    }
}

/// Per-user rollup over stored trajectories.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserTrajectoryStats {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub total_trajectories: u64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub active_trajectories: u64,
    /// Meters
    pub total_distance: f64,
    /// Seconds
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub total_duration: i64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub total_points: u64,
    /// Mean of the per-trajectory average speeds (m/s)
    pub avg_speed: f64,
    /// Fastest recorded speed across all trajectories (m/s)
    pub max_speed: f64,
}

impl UserTrajectoryStats {
    pub fn from_trajectories<'a>(trajectories: impl IntoIterator<Item = &'a Trajectory>) -> Self {
        let mut stats = Self::default();
        let mut avg_speed_sum = 0.0;

        for trajectory in trajectories {
            stats.total_trajectories += 1;
            if trajectory.is_active {
                stats.active_trajectories += 1;
            }
            stats.total_distance += trajectory.distance;
            stats.total_duration += trajectory.duration;
            stats.total_points += trajectory.point_count;
            avg_speed_sum += trajectory.avg_speed;
            if trajectory.max_speed > stats.max_speed {
                stats.max_speed = trajectory.max_speed;
            }
        }

        if stats.total_trajectories > 0 {
            stats.avg_speed = avg_speed_sum / stats.total_trajectories as f64;
        }
        stats
    }
}
