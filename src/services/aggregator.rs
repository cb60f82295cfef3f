// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Trajectory statistics recomputation.
//!
//! [`TrajectoryAggregator`] rebuilds the stored summary of one trajectory
//! from its full, timestamp-ordered point set. [`AggregationScheduler`]
//! runs those recomputations off the request path on a single worker and
//! coalesces repeated requests for the same trajectory.

use crate::db::{PointFilter, TrajectoryStore};
use crate::error::Result;
use crate::models::{TrajectoryChanges, TrajectoryStats};
use crate::time_utils::now_millis;
use dashmap::DashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Recomputes derived trajectory statistics.
#[derive(Clone)]
pub struct TrajectoryAggregator {
    store: Arc<dyn TrajectoryStore>,
}

impl TrajectoryAggregator {
    pub fn new(store: Arc<dyn TrajectoryStore>) -> Self {
        Self { store }
    }

    /// Recompute and persist the stats of one trajectory.
    ///
    /// Returns `None` when the trajectory no longer exists.
    pub async fn recompute(&self, trajectory_id: &str) -> Result<Option<TrajectoryStats>> {
        let Some(trajectory) = self.store.get_trajectory(trajectory_id).await? else {
            tracing::debug!(trajectory_id, "Trajectory gone, skipping aggregation");
            return Ok(None);
        };

        let points = self
            .store
            .query_points(&PointFilter::for_trajectory(trajectory_id))
            .await?;
        let stats = TrajectoryStats::from_points(&points);

        if stats == trajectory.stats() {
            return Ok(Some(stats));
        }

        self.store
            .update_trajectory(trajectory_id, &TrajectoryChanges::stats(stats, now_millis()))
            .await?;

        tracing::debug!(
            trajectory_id,
            point_count = stats.point_count,
            distance = stats.distance,
            "Trajectory stats updated"
        );
        Ok(Some(stats))
    }
}

/// Background queue of trajectories awaiting recomputation.
pub struct AggregationScheduler {
    sender: Mutex<Option<mpsc::Sender<String>>>,
    pending: Arc<DashSet<String>>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl AggregationScheduler {
    /// Spawn the aggregation worker.
    pub fn start(aggregator: TrajectoryAggregator, capacity: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<String>(capacity);
        let pending: Arc<DashSet<String>> = Arc::new(DashSet::new());

        let worker_pending = pending.clone();
        let worker = tokio::spawn(async move {
            while let Some(trajectory_id) = receiver.recv().await {
                // Clear first so points committed during the recompute
                // schedule another pass.
                worker_pending.remove(&trajectory_id);
                if let Err(e) = aggregator.recompute(&trajectory_id).await {
                    tracing::error!(
                        trajectory_id = %trajectory_id,
                        error = %e,
                        "Failed to recompute trajectory stats"
                    );
                }
            }
            tracing::debug!("Aggregation worker stopped");
        });

        Self {
            sender: Mutex::new(Some(sender)),
            pending,
            worker: tokio::sync::Mutex::new(Some(worker)),
        }
    }

    /// Request a recomputation. Returns whether it was queued now.
    ///
    /// A trajectory already waiting in the queue is not queued twice.
    pub fn schedule(&self, trajectory_id: &str) -> bool {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = guard.as_ref() else {
            tracing::debug!(trajectory_id, "Aggregation scheduler stopped, dropping request");
            return false;
        };

        if !self.pending.insert(trajectory_id.to_string()) {
            return false;
        }

        if let Err(e) = sender.try_send(trajectory_id.to_string()) {
            self.pending.remove(trajectory_id);
            tracing::warn!(trajectory_id, error = %e, "Could not schedule aggregation");
            return false;
        }
        true
    }

    /// Number of trajectories waiting for recomputation.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Stop accepting work and wait for queued recomputations to finish.
    pub async fn shutdown(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(sender);

        if let Some(worker) = self.worker.lock().await.take() {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Aggregation worker panicked");
            }
        }
    }
}
