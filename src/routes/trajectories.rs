// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Trajectory routes.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::{
    BatchAccepted, BatchPointsRequest, CreateTrajectoryRequest, LocationPoint, Page, PointQuery,
    Trajectory, TrajectoryDetail, TrajectoryQuery, UpdateTrajectoryRequest, UserTrajectoryStats,
};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

/// Trajectory routes (auth middleware is applied in routes/mod.rs).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/trajectories",
            post(create_trajectory).get(list_trajectories),
        )
        .route(
            "/api/trajectories/{id}",
            get(get_trajectory)
                .put(update_trajectory)
                .delete(delete_trajectory),
        )
        .route("/api/trajectories/{id}/finish", post(finish_trajectory))
        .route("/api/trajectories/{id}/points", get(get_trajectory_points))
        .route("/api/trajectories/{id}/points/batch", post(add_points_batch))
        .route("/api/stats", get(get_stats))
}

async fn create_trajectory(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CreateTrajectoryRequest>,
) -> Result<(StatusCode, Json<Trajectory>)> {
    let trajectory = state
        .service
        .create_trajectory(&user.user_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(trajectory)))
}

async fn list_trajectories(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<TrajectoryQuery>,
) -> Result<Json<Page<Trajectory>>> {
    Ok(Json(
        state
            .service
            .list_trajectories(&user.user_id, &query)
            .await?,
    ))
}

#[derive(Debug, Default, Deserialize)]
struct DetailParams {
    #[serde(default)]
    include_points: bool,
}

async fn get_trajectory(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Query(params): Query<DetailParams>,
) -> Result<Json<TrajectoryDetail>> {
    Ok(Json(
        state
            .service
            .get_trajectory(&user.user_id, &id, params.include_points)
            .await?,
    ))
}

async fn update_trajectory(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(request): Json<UpdateTrajectoryRequest>,
) -> Result<Json<Trajectory>> {
    Ok(Json(
        state
            .service
            .update_trajectory(&user.user_id, &id, request)
            .await?,
    ))
}

async fn finish_trajectory(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Trajectory>> {
    Ok(Json(
        state.service.finish_trajectory(&user.user_id, &id).await?,
    ))
}

async fn delete_trajectory(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.service.delete_trajectory(&user.user_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_trajectory_points(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Query(mut query): Query<PointQuery>,
) -> Result<Json<Page<LocationPoint>>> {
    query.trajectory_id = Some(id);
    Ok(Json(state.service.get_points(&user.user_id, &query).await?))
}

/// Queue a bulk upload. Persistence happens in the background.
async fn add_points_batch(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(request): Json<BatchPointsRequest>,
) -> Result<(StatusCode, Json<BatchAccepted>)> {
    let accepted = state
        .service
        .add_points_batch(&user.user_id, &id, request)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

async fn get_stats(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<TrajectoryQuery>,
) -> Result<Json<UserTrajectoryStats>> {
    Ok(Json(
        state.service.get_user_stats(&user.user_id, &query).await?,
    ))
}
