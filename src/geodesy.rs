// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Great-circle distance and bounding box helpers.

use geo::{coord, Distance, HaversineMeasure, Intersects, Point, Rect};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Mean Earth radius used for haversine distances (meters).
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Haversine great-circle distance between two WGS84 coordinates, in meters.
///
/// Inputs are not validated; NaN propagates.
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    HaversineMeasure::new(EARTH_RADIUS_METERS)
        .distance(Point::new(lon1, lat1), Point::new(lon2, lat2))
}

/// Axis-aligned latitude/longitude box.
///
/// All zeros when a trajectory has no points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl BoundingBox {
    /// Degenerate box covering a single coordinate.
    pub fn from_point(latitude: f64, longitude: f64) -> Self {
        Self {
            min_latitude: latitude,
            max_latitude: latitude,
            min_longitude: longitude,
            max_longitude: longitude,
        }
    }

    /// Build a box from two corners in any order.
    pub fn from_corners(lat_a: f64, lon_a: f64, lat_b: f64, lon_b: f64) -> Self {
        Self {
            min_latitude: lat_a.min(lat_b),
            max_latitude: lat_a.max(lat_b),
            min_longitude: lon_a.min(lon_b),
            max_longitude: lon_a.max(lon_b),
        }
    }

    /// The box as a `geo` rectangle (x = longitude, y = latitude).
    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            coord! { x: self.min_longitude, y: self.min_latitude },
            coord! { x: self.max_longitude, y: self.max_latitude },
        )
    }

    /// Whether the coordinate lies inside the box, edges included.
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        self.to_rect().intersects(&Point::new(longitude, latitude))
    }
}

/// Grow `current` to include the given coordinate.
///
/// `None` stands for the empty box, which collapses to the point itself.
pub fn expand_bounding_box(current: Option<BoundingBox>, latitude: f64, longitude: f64) -> BoundingBox {
    match current {
        None => BoundingBox::from_point(latitude, longitude),
        Some(bounds) => BoundingBox {
            min_latitude: bounds.min_latitude.min(latitude),
            max_latitude: bounds.max_latitude.max(latitude),
            min_longitude: bounds.min_longitude.min(longitude),
            max_longitude: bounds.max_longitude.max(longitude),
        },
    }
}
