// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Why a user has no usable Google Analytics credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotConnectedReason {
    /// No credential record exists.
    NoRecord,
    /// A record exists but the access or refresh token is empty.
    MissingTokens,
    /// The access token was stale and the provider rejected the refresh.
    RefreshFailed,
}

impl std::fmt::Display for NotConnectedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            NotConnectedReason::NoRecord => "Google Analytics is not connected",
            NotConnectedReason::MissingTokens => "Stored Google Analytics tokens are incomplete",
            NotConnectedReason::RefreshFailed => "Google Analytics access could not be refreshed",
        };
        f.write_str(msg)
    }
}

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("CSRF verification failed")]
    CsrfFailed,

    #[error("Invalid OAuth state: {0}")]
    InvalidState(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("{0}")]
    NotConnected(NotConnectedReason),

    #[error("Google API error: {0}")]
    GoogleApi(String),

    #[error("Upstream request failed: {message}")]
    Upstream {
        message: String,
        traceback: Option<String>,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    connected: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    traceback: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut connected = None;
        let mut traceback = None;

        let (status, error, details) = match self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::CsrfFailed => (StatusCode::FORBIDDEN, "csrf_failed", None),
            AppError::InvalidState(msg) => {
                tracing::warn!(reason = %msg, "Rejected OAuth callback state");
                (StatusCode::BAD_REQUEST, "invalid_state", Some(msg))
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg)),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", Some(msg)),
            AppError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                Some(errors.to_string()),
            ),
            AppError::NotConnected(reason) => {
                connected = Some(false);
                (StatusCode::BAD_REQUEST, "not_connected", Some(reason.to_string()))
            }
            AppError::GoogleApi(msg) => {
                tracing::error!(error = %msg, "Google API error");
                (StatusCode::INTERNAL_SERVER_ERROR, "google_error", Some(msg))
            }
            AppError::Upstream {
                message,
                traceback: trace,
            } => {
                traceback = trace;
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "upstream_error",
                    Some(message),
                )
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
            connected,
            traceback,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
