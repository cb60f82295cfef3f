// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Bounded worker pool for bulk point uploads.
//!
//! A fixed number of workers drain one shared queue of [`UploadTask`]s.
//! Each task is written in sub-batches, one store transaction per
//! sub-batch. Failed attempts are retried with linear backoff from a
//! separate task so the worker slot is freed while waiting.

use crate::config::TrackingConfig;
use crate::db::{TrajectoryStore, WriteOp};
use crate::error::{AppError, Result};
use crate::models::LocationPoint;
use crate::services::aggregator::AggregationScheduler;
use crate::time_utils::now_millis;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

/// One bulk upload: insert `points` into `trajectory_id`.
#[derive(Debug, Clone)]
pub struct UploadTask {
    pub user_id: String,
    pub trajectory_id: String,
    pub points: Vec<LocationPoint>,
    pub retry_count: u32,
    /// Points already committed by earlier attempts.
    pub committed: usize,
    pub created_at: i64,
}

impl UploadTask {
    pub fn new(user_id: &str, trajectory_id: &str, points: Vec<LocationPoint>) -> Self {
        Self {
            user_id: user_id.to_string(),
            trajectory_id: trajectory_id.to_string(),
            points,
            retry_count: 0,
            committed: 0,
            created_at: now_millis(),
        }
    }

    fn remaining(&self) -> usize {
        self.points.len() - self.committed
    }
}

/// Snapshot of the pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UploadPoolMetrics {
    pub submitted: u64,
    pub succeeded: u64,
    pub retried: u64,
    /// Tasks dropped after exhausting retries or on a permanent error
    pub failed: u64,
    pub dropped_on_shutdown: u64,
    pub points_persisted: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    succeeded: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
    dropped_on_shutdown: AtomicU64,
    points_persisted: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> UploadPoolMetrics {
        UploadPoolMetrics {
            submitted: self.submitted.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped_on_shutdown: self.dropped_on_shutdown.load(Ordering::Relaxed),
            points_persisted: self.points_persisted.load(Ordering::Relaxed),
        }
    }
}

/// How one processing attempt ended.
enum Attempt {
    Completed,
    Cancelled,
}

/// State shared by the workers and their retry timers.
struct WorkerContext {
    store: Arc<dyn TrajectoryStore>,
    scheduler: Arc<AggregationScheduler>,
    sender: mpsc::Sender<UploadTask>,
    cancel: watch::Receiver<bool>,
    counters: Arc<Counters>,
    retry_limit: u32,
    retry_base_delay: Duration,
    sub_batch_size: usize,
}

impl WorkerContext {
    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    async fn process(self: &Arc<Self>, mut task: UploadTask) {
        let committed_before = task.committed;
        let result = self.persist(&mut task).await;

        if task.committed > committed_before {
            self.scheduler.schedule(&task.trajectory_id);
        }

        match result {
            Ok(Attempt::Completed) => {
                self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    trajectory_id = %task.trajectory_id,
                    count = task.points.len(),
                    attempts = task.retry_count + 1,
                    "Batch persisted"
                );
            }
            Ok(Attempt::Cancelled) => {
                self.counters
                    .dropped_on_shutdown
                    .fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    trajectory_id = %task.trajectory_id,
                    remaining = task.remaining(),
                    "Upload interrupted by shutdown"
                );
            }
            Err(e) if e.is_retryable() && task.retry_count < self.retry_limit => {
                self.schedule_retry(task, &e);
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    trajectory_id = %task.trajectory_id,
                    user_id = %task.user_id,
                    attempts = task.retry_count + 1,
                    remaining = task.remaining(),
                    error = %e,
                    "Upload failed permanently, dropping task"
                );
            }
        }
    }

    /// Write the uncommitted sub-batches of `task`.
    ///
    /// Each sub-batch is validated before its transaction; an invalid point
    /// stops the task with nothing from its sub-batch written.
    /// Cancellation is observed between sub-batches only.
    async fn persist(&self, task: &mut UploadTask) -> Result<Attempt> {
        while task.committed < task.points.len() {
            if self.is_cancelled() {
                return Ok(Attempt::Cancelled);
            }

            let end = (task.committed + self.sub_batch_size).min(task.points.len());
            for (index, point) in task.points[task.committed..end]
                .iter()
                .enumerate()
                .map(|(i, p)| (task.committed + i, p))
            {
                if point.trajectory_id != task.trajectory_id {
                    return Err(AppError::validation(
                        format!("points[{}].trajectory_id", index),
                        "does not match the upload",
                    ));
                }
                point.validate_in_batch(index)?;
            }
            let writes: Vec<WriteOp> = task.points[task.committed..end]
                .iter()
                .cloned()
                .map(WriteOp::InsertPoint)
                .collect();
            self.store.transaction(writes).await?;

            let written = end - task.committed;
            self.counters
                .points_persisted
                .fetch_add(written as u64, Ordering::Relaxed);
            task.committed = end;
            tracing::debug!(
                trajectory_id = %task.trajectory_id,
                written,
                committed = task.committed,
                total = task.points.len(),
                "Sub-batch committed"
            );
        }
        Ok(Attempt::Completed)
    }

    /// Requeue `task` after `retry_base_delay * attempt` without holding a worker.
    fn schedule_retry(self: &Arc<Self>, mut task: UploadTask, error: &AppError) {
        task.retry_count += 1;
        let delay = self.retry_base_delay * task.retry_count;
        self.counters.retried.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            trajectory_id = %task.trajectory_id,
            retry = task.retry_count,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Upload attempt failed, retrying"
        );

        let sender = self.sender.clone();
        let mut cancel = self.cancel.clone();
        let counters = self.counters.clone();
        tokio::spawn(async move {
            let trajectory_id = task.trajectory_id.clone();
            let waited = tokio::select! {
                biased;
                _ = cancel.wait_for(|cancelled| *cancelled) => false,
                _ = tokio::time::sleep(delay) => true,
            };
            let requeued = waited
                && tokio::select! {
                    biased;
                    _ = cancel.wait_for(|cancelled| *cancelled) => false,
                    sent = sender.send(task) => sent.is_ok(),
                };

            if !requeued {
                counters.dropped_on_shutdown.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    trajectory_id = %trajectory_id,
                    "Pool shutting down, retry dropped"
                );
            }
        });
    }
}

/// Fixed-size pool of upload workers over one bounded queue.
pub struct UploadWorkerPool {
    sender: mpsc::Sender<UploadTask>,
    receiver: Arc<Mutex<mpsc::Receiver<UploadTask>>>,
    cancel: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl UploadWorkerPool {
    /// Spawn `config.worker_count` workers.
    pub fn start(
        store: Arc<dyn TrajectoryStore>,
        scheduler: Arc<AggregationScheduler>,
        config: &TrackingConfig,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let (cancel, cancel_rx) = watch::channel(false);
        let counters = Arc::new(Counters::default());

        let context = Arc::new(WorkerContext {
            store,
            scheduler,
            sender: sender.clone(),
            cancel: cancel_rx,
            counters: counters.clone(),
            retry_limit: config.retry_limit,
            retry_base_delay: config.retry_base_delay,
            sub_batch_size: config.sub_batch_size,
        });

        let workers: Vec<JoinHandle<()>> = (0..config.worker_count)
            .map(|worker_id| {
                tokio::spawn(run_worker(worker_id, context.clone(), receiver.clone()))
            })
            .collect();

        tracing::info!(
            workers = config.worker_count,
            queue_capacity = config.queue_capacity,
            "Upload worker pool started"
        );

        Self {
            sender,
            receiver,
            cancel,
            workers: Mutex::new(workers),
            counters,
        }
    }

    /// Enqueue a task without waiting for queue space.
    pub fn submit(&self, task: UploadTask) -> Result<()> {
        if *self.cancel.borrow() {
            return Err(AppError::ShuttingDown);
        }

        match self.sender.try_send(task) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(task)) => {
                tracing::warn!(
                    trajectory_id = %task.trajectory_id,
                    count = task.points.len(),
                    "Upload queue full, rejecting batch"
                );
                Err(AppError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(AppError::ShuttingDown),
        }
    }

    /// Tasks currently waiting in the queue.
    pub fn pending(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn metrics(&self) -> UploadPoolMetrics {
        self.counters.snapshot()
    }

    /// Stop the workers and discard whatever is still queued.
    ///
    /// A worker in the middle of a task finishes its current sub-batch
    /// first. Pending retries are abandoned.
    pub async fn shutdown(&self) {
        self.cancel.send_replace(true);

        let workers = std::mem::take(&mut *self.workers.lock().await);
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Upload worker panicked");
            }
        }

        let mut receiver = self.receiver.lock().await;
        receiver.close();
        let mut dropped = 0u64;
        while let Ok(task) = receiver.try_recv() {
            dropped += 1;
            tracing::warn!(
                trajectory_id = %task.trajectory_id,
                count = task.points.len(),
                "Discarding queued upload on shutdown"
            );
        }
        self.counters
            .dropped_on_shutdown
            .fetch_add(dropped, Ordering::Relaxed);

        tracing::info!(dropped, "Upload worker pool stopped");
    }
}

async fn run_worker(
    worker_id: usize,
    context: Arc<WorkerContext>,
    receiver: Arc<Mutex<mpsc::Receiver<UploadTask>>>,
) {
    let mut cancel = context.cancel.clone();
    loop {
        let task = tokio::select! {
            biased;
            _ = cancel.wait_for(|cancelled| *cancelled) => break,
            task = async { receiver.lock().await.recv().await } => task,
        };
        let Some(task) = task else {
            break;
        };
        context.process(task).await;
    }
    tracing::debug!(worker_id, "Upload worker exiting");
}
