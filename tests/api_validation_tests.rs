// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API input validation tests.

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use location_tracker::AppState;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

mod common;

async fn send(app: &Router, method: &str, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn setup() -> (Router, Arc<AppState>, String, String) {
    let (app, state) = common::create_test_app();
    let token = common::create_test_jwt("alice", &state.config.jwt_signing_key);
    let (status, body) = send(
        &app,
        "POST",
        "/api/trajectories",
        &token,
        json!({ "name": "Ride", "start_time": 1_700_000_000_000i64 }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["id"].as_str().unwrap().to_string();
    (app, state, token, id)
}

#[tokio::test]
async fn test_empty_trajectory_name() {
    let (app, state) = common::create_test_app();
    let token = common::create_test_jwt("alice", &state.config.jwt_signing_key);

    let (status, body) = send(
        &app,
        "POST",
        "/api/trajectories",
        &token,
        json!({ "name": "", "start_time": 1_700_000_000_000i64 }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn test_point_out_of_range() {
    let (app, state, token, id) = setup().await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/points",
        &token,
        json!({
            "trajectory_id": id,
            "latitude": 91.0,
            "longitude": 0.0,
            "timestamp": 1_700_000_000_000i64
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
    assert!(body["details"].as_str().unwrap().contains("latitude"));

    state.service.shutdown().await;
}

#[tokio::test]
async fn test_valid_point_created() {
    let (app, state, token, id) = setup().await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/points",
        &token,
        json!({
            "trajectory_id": id,
            "latitude": 37.4,
            "longitude": -122.1,
            "speed": 2.5,
            "timestamp": 1_700_000_000_000i64
        }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["trajectory_id"], id.as_str());
    assert_eq!(body["user_id"], "alice");

    state.service.shutdown().await;
}

#[tokio::test]
async fn test_batch_accepted() {
    let (app, state, token, id) = setup().await;

    let points: Vec<Value> = (1..=3)
        .map(|ts| json!({ "latitude": 37.4, "longitude": -122.1, "timestamp": ts }))
        .collect();
    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/trajectories/{}/points/batch", id),
        &token,
        json!({ "points": points }),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["accepted"], true);
    assert_eq!(body["point_count"], 3);

    state.service.shutdown().await;
}

#[tokio::test]
async fn test_batch_reports_failing_index() {
    let (app, state, token, id) = setup().await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/trajectories/{}/points/batch", id),
        &token,
        json!({ "points": [
            { "latitude": 37.4, "longitude": -122.1, "timestamp": 1 },
            { "latitude": 37.4, "longitude": 200.0, "timestamp": 2 }
        ] }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"]
        .as_str()
        .unwrap()
        .contains("points[1].longitude"));
    assert_eq!(state.service.pool().metrics().submitted, 0);

    state.service.shutdown().await;
}

#[tokio::test]
async fn test_empty_batch_rejected() {
    let (app, state, token, id) = setup().await;

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/trajectories/{}/points/batch", id),
        &token,
        json!({ "points": [] }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);

    state.service.shutdown().await;
}

#[tokio::test]
async fn test_end_time_before_start() {
    let (app, state, token, id) = setup().await;

    let (status, body) = send(
        &app,
        "PUT",
        &format!("/api/trajectories/{}", id),
        &token,
        json!({ "end_time": 1_600_000_000_000i64 }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"].as_str().unwrap().contains("end_time"));

    state.service.shutdown().await;
}

#[tokio::test]
async fn test_malformed_json_rejected() {
    let (app, state) = common::create_test_app();
    let token = common::create_test_jwt("alice", &state.config.jwt_signing_key);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/trajectories")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}
