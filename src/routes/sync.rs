// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Offline client reconciliation.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::{SyncRequest, SyncResponse, SyncStatus};
use crate::AppState;
use axum::{
    extract::State,
    routing::{get, post},
    Extension, Json, Router,
};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/sync", post(sync_data))
        .route("/api/sync/status", get(sync_status))
}

async fn sync_data(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<SyncRequest>,
) -> Result<Json<SyncResponse>> {
    Ok(Json(state.service.sync_data(&user.user_id, request).await?))
}

async fn sync_status(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Json<SyncStatus> {
    Json(state.service.sync_status(&user.user_id))
}
