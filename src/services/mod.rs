// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod aggregator;
pub mod cleanup;
pub mod trajectory;
pub mod upload_pool;

pub use aggregator::{AggregationScheduler, TrajectoryAggregator};
pub use cleanup::{spawn_cleanup_job, CleanupReport};
pub use trajectory::TrajectoryService;
pub use upload_pool::{UploadPoolMetrics, UploadTask, UploadWorkerPool};
