//! Client reconciliation types.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::models::Trajectory;

/// What the client already knows.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncRequest {
    /// Last successful sync (epoch ms)
    pub last_sync_time: i64,
    /// Trajectory IDs held locally by the client
    #[serde(default)]
    pub trajectory_ids: Vec<String>,
}

/// Three-way diff against the server state.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SyncResponse {
    /// Created after `last_sync_time`
    pub new_trajectories: Vec<Trajectory>,
    /// Created at or before `last_sync_time`, updated after it
    pub updated_trajectories: Vec<Trajectory>,
    /// Known to the client but gone from the server
    pub deleted_trajectory_ids: Vec<String>,
    /// Server time of this sync (epoch ms)
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub sync_time: i64,
}

/// Background upload progress for the sync status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub user_id: String,
    /// Upload tasks waiting in the worker pool queue (all users)
    pub pending_uploads: usize,
    /// Trajectories waiting for stats recomputation (all users)
    pub pending_aggregations: usize,
    pub server_time: i64,
    pub uploads: crate::services::upload_pool::UploadPoolMetrics,
}
