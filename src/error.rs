// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDate;
use serde::Serialize;

use crate::models::Weekday;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Credential refresh failed for user {user_id}: {reason}")]
    CredentialRefresh {
        user_id: String,
        /// HTTP status returned by the token endpoint, if it answered at all
        status: Option<u16>,
        reason: String,
    },

    #[error("No training plan for user {user_id}, week of {week_start}")]
    PlanNotFound {
        user_id: String,
        week_start: NaiveDate,
    },

    #[error("No workout found for {day} in week of {week_start} (user {user_id})")]
    WorkoutNotFound {
        user_id: String,
        week_start: NaiveDate,
        day: Weekday,
    },

    #[error("Invalid workout patch: {0}")]
    InvalidPatch(String),

    #[error("Invalid training plan: {0}")]
    InvalidPlan(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Whether the caller may retry the same request with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::CredentialRefresh { .. } | AppError::StoreUnavailable(_)
        )
    }

    /// Stable machine-readable error code used in response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::CredentialRefresh { .. } => "credential_refresh_failed",
            AppError::PlanNotFound { .. } => "plan_not_found",
            AppError::WorkoutNotFound { .. } => "workout_not_found",
            AppError::InvalidPatch(_) => "invalid_patch",
            AppError::InvalidPlan(_) => "invalid_plan",
            AppError::BadRequest(_) => "bad_request",
            AppError::StoreUnavailable(_) => "store_unavailable",
            AppError::Internal(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_)
            | AppError::PlanNotFound { .. }
            | AppError::WorkoutNotFound { .. } => StatusCode::NOT_FOUND,
            AppError::CredentialRefresh { .. } => StatusCode::BAD_GATEWAY,
            AppError::InvalidPatch(_) | AppError::InvalidPlan(_) | AppError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    retryable: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let details = match &self {
            AppError::StoreUnavailable(msg) => {
                tracing::error!(error = %msg, "Store unavailable");
                None
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                None
            }
            AppError::CredentialRefresh {
                user_id, status, ..
            } => {
                tracing::warn!(user_id = %user_id, status = ?status, "Credential refresh failed");
                Some(self.to_string())
            }
            _ => Some(self.to_string()),
        };

        let body = ErrorResponse {
            error: self.code().to_string(),
            details,
            retryable: self.is_retryable(),
        };

        (self.status(), Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
