// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod point;
pub mod stats;
pub mod sync;
pub mod trajectory;

pub use point::{
    AddPointRequest, BatchAccepted, BatchPointsRequest, LocationPoint, PointInput, PointQuery,
};
pub use stats::{StatsAccumulator, TrajectoryStats, UserTrajectoryStats};
pub use sync::{SyncRequest, SyncResponse, SyncStatus};
pub use trajectory::{
    CreateTrajectoryRequest, Page, SortDirection, Trajectory, TrajectoryChanges, TrajectoryDetail,
    TrajectoryQuery, TrajectorySortField, UpdateTrajectoryRequest,
};
