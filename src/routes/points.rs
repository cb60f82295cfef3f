// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Single-point routes.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::{AddPointRequest, LocationPoint, Page, PointQuery};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, post},
    Extension, Json, Router,
};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/points", post(add_point).get(get_points))
        .route("/api/points/{id}", delete(delete_point))
}

async fn add_point(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<AddPointRequest>,
) -> Result<(StatusCode, Json<LocationPoint>)> {
    let point = state.service.add_point(&user.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(point)))
}

async fn get_points(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<PointQuery>,
) -> Result<Json<Page<LocationPoint>>> {
    Ok(Json(state.service.get_points(&user.user_id, &query).await?))
}

async fn delete_point(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.service.delete_point(&user.user_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
