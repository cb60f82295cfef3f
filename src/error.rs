// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use crate::db::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Upload queue is full")]
    QueueFull,

    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("Service is shutting down")]
    ShuttingDown,

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn trajectory_not_found() -> Self {
        AppError::NotFound("trajectory not found".to_string())
    }

    /// Whether a failed background write may succeed if attempted again.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Storage(e) => e.is_transient(),
            AppError::Internal(_) => true,
            _ => false,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    /// Reports the first failing field in name order.
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));

        match fields.into_iter().next() {
            Some((field, failures)) => {
                let reason = failures
                    .first()
                    .map(|failure| match &failure.message {
                        Some(message) => message.to_string(),
                        None => failure.code.to_string(),
                    })
                    .unwrap_or_else(|| "invalid".to_string());
                AppError::validation(field.to_string(), reason)
            }
            None => AppError::BadRequest(errors.to_string()),
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::Validation { .. } => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                Some(self.to_string()),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::QueueFull => (StatusCode::TOO_MANY_REQUESTS, "queue_full", None),
            AppError::LimitExceeded(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "limit_exceeded",
                Some(msg.clone()),
            ),
            AppError::ShuttingDown => (StatusCode::SERVICE_UNAVAILABLE, "shutting_down", None),
            AppError::Storage(err) if err.is_transient() => {
                tracing::warn!(error = %err, "Transient storage error");
                (StatusCode::SERVICE_UNAVAILABLE, "storage_unavailable", None)
            }
            AppError::Storage(err) => {
                tracing::error!(error = %err, "Storage error");
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
