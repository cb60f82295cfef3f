//! Periodic retention cleanup.

use crate::services::TrajectoryService;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Outcome of one cleanup run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub retention_days: u32,
    /// Records created before this instant were eligible (epoch ms)
    pub cutoff: i64,
    pub points_deleted: u64,
    pub trajectories_deleted: u64,
}

/// Run [`TrajectoryService::cleanup_expired_data`] every `interval` until
/// `shutdown` flips to true.
///
/// The first run happens one full interval after start.
pub fn spawn_cleanup_job(
    service: Arc<TrajectoryService>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = async {
                    let _ = shutdown.wait_for(|stop| *stop).await;
                } => break,
                _ = ticker.tick() => {
                    if let Err(e) = service.cleanup_expired_data(0).await {
                        tracing::error!(error = %e, "Retention cleanup failed");
                    }
                }
            }
        }
        tracing::debug!("Retention cleanup job stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackingConfig;
    use crate::db::MemoryStore;

    #[tokio::test(start_paused = true)]
    async fn test_job_stops_on_shutdown() {
        let service = Arc::new(TrajectoryService::start(
            Arc::new(MemoryStore::new()),
            TrackingConfig::default(),
        ));
        let (stop, stop_rx) = watch::channel(false);
        let job = spawn_cleanup_job(service.clone(), Duration::from_secs(60), stop_rx);

        tokio::time::sleep(Duration::from_secs(130)).await;
        stop.send_replace(true);
        job.await.unwrap();

        service.shutdown().await;
    }
}
