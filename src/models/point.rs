// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Location point model and ingestion validation.

use crate::error::AppError;
use crate::geodesy::BoundingBox;
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Altitudes outside this range (meters) are treated as GPS glitches.
pub const MIN_ALTITUDE_METERS: f64 = -1000.0;
pub const MAX_ALTITUDE_METERS: f64 = 10_000.0;

/// Stored location point. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct LocationPoint {
    pub id: String,
    pub trajectory_id: String,
    pub user_id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Meters
    pub altitude: Option<f64>,
    /// Meters, non-negative
    pub accuracy: Option<f64>,
    /// Device-reported meters per second, non-negative
    pub speed: Option<f64>,
    /// Degrees
    pub bearing: Option<f64>,
    /// Fix time (epoch ms)
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub timestamp: i64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub created_at: i64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub updated_at: i64,
}

/// A single fix as submitted by a client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointInput {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub bearing: Option<f64>,
    pub timestamp: i64,
}

/// Request body for adding one point.
#[derive(Debug, Clone, Deserialize)]
pub struct AddPointRequest {
    pub trajectory_id: String,
    #[serde(flatten)]
    pub point: PointInput,
}

/// Request body for a bulk upload.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchPointsRequest {
    pub points: Vec<PointInput>,
}

/// Acknowledgement that a bulk upload was queued.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct BatchAccepted {
    pub accepted: bool,
    pub trajectory_id: String,
    pub point_count: u32,
}

impl LocationPoint {
    /// Build a new point record owned by `user_id`.
    pub fn from_input(user_id: &str, trajectory_id: &str, input: PointInput, now: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            trajectory_id: trajectory_id.to_string(),
            user_id: user_id.to_string(),
            latitude: input.latitude,
            longitude: input.longitude,
            altitude: input.altitude,
            accuracy: input.accuracy,
            speed: input.speed,
            bearing: input.bearing,
            timestamp: input.timestamp,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check the point against the ingestion rules.
    ///
    /// Reports the first violated field, in declaration order.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.trajectory_id.trim().is_empty() {
            return Err(AppError::validation("trajectory_id", "must not be empty"));
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(AppError::validation(
                "latitude",
                format!("{} is outside [-90, 90]", self.latitude),
            ));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(AppError::validation(
                "longitude",
                format!("{} is outside [-180, 180]", self.longitude),
            ));
        }
        if self.timestamp <= 0 {
            return Err(AppError::validation("timestamp", "must be positive"));
        }
        if let Some(accuracy) = self.accuracy {
            if accuracy.is_nan() || accuracy < 0.0 {
                return Err(AppError::validation("accuracy", "must be non-negative"));
            }
        }
        if let Some(speed) = self.speed {
            if speed.is_nan() || speed < 0.0 {
                return Err(AppError::validation("speed", "must be non-negative"));
            }
        }
        if let Some(altitude) = self.altitude {
            if !(MIN_ALTITUDE_METERS..=MAX_ALTITUDE_METERS).contains(&altitude) {
                return Err(AppError::validation(
                    "altitude",
                    format!(
                        "{} is outside [{}, {}]",
                        altitude, MIN_ALTITUDE_METERS, MAX_ALTITUDE_METERS
                    ),
                ));
            }
        }
        Ok(())
    }

    /// [`validate`](Self::validate) for the point at `index` of a batch.
    ///
    /// The reported field is prefixed with `points[index].`.
    pub fn validate_in_batch(&self, index: usize) -> Result<(), AppError> {
        self.validate().map_err(|e| match e {
            AppError::Validation { field, reason } => {
                AppError::validation(format!("points[{}].{}", index, field), reason)
            }
            other => other,
        })
    }

    /// Whether both coordinates are usable for distance computation.
    pub fn has_valid_coordinates(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Filters for listing a user's points.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PointQuery {
    /// Restrict to one trajectory
    pub trajectory_id: Option<String>,
    /// Inclusive lower bound on `timestamp` (epoch ms)
    pub start_time: Option<i64>,
    /// Inclusive upper bound on `timestamp` (epoch ms)
    pub end_time: Option<i64>,
    pub min_lat: Option<f64>,
    pub max_lat: Option<f64>,
    pub min_lng: Option<f64>,
    pub max_lng: Option<f64>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl PointQuery {
    /// The bounding box filter, when all four edges were given.
    pub fn bounds(&self) -> Option<BoundingBox> {
        match (self.min_lat, self.max_lat, self.min_lng, self.max_lng) {
            (Some(min_lat), Some(max_lat), Some(min_lng), Some(max_lng)) => {
                Some(BoundingBox::from_corners(min_lat, min_lng, max_lat, max_lng))
            }
            _ => None,
        }
    }
}
