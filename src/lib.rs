// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Location tracker: trajectory recording backend.
//!
//! Clients stream GPS fixes into trajectories, either one at a time or as
//! bulk uploads handled by a background worker pool. Per-trajectory
//! statistics (distance, speeds, bounding box) are recomputed off the
//! request path after every change.

pub mod config;
pub mod db;
pub mod error;
pub mod geodesy;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use services::TrajectoryService;
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub service: Arc<TrajectoryService>,
}
