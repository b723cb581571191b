// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated callers.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{PlanDraft, Weekday, Workout};
use crate::services::PlanLookup;
use crate::time_utils::parse_iso_date;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{get, patch},
    Extension, Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/credential", get(get_credential))
        .route("/api/plans", get(get_plan).post(save_plan))
        .route(
            "/api/plans/{week_start}/workouts/{day}",
            patch(update_workout),
        )
}

fn parse_week_start(raw: &str) -> Result<NaiveDate> {
    parse_iso_date(raw).ok_or_else(|| {
        AppError::BadRequest(format!(
            "Invalid week_start '{}': expected YYYY-MM-DD",
            raw
        ))
    })
}

// ─── Credentials ─────────────────────────────────────────────

/// A credential ready for use against the Strava API.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(feature = "binding-generation", ts(export, export_to = "bindings/"))]
pub struct CredentialResponse {
    pub user_id: String,
    pub access_token: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub expires_at: i64,
}

/// Get a currently valid access token, refreshing it first if needed.
async fn get_credential(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<CredentialResponse>> {
    let credential = state.credentials.get_valid_credential(&user.user_id).await?;

    Ok(Json(CredentialResponse {
        user_id: credential.user_id,
        access_token: credential.access_token,
        expires_at: credential.expires_at,
    }))
}

// ─── Plans ───────────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(feature = "binding-generation", ts(export, export_to = "bindings/"))]
pub struct SavePlanResponse {
    pub success: bool,
    pub message: String,
    pub goal: String,
    pub weeks_saved: usize,
}

/// Save a full plan, one document per week.
async fn save_plan(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<SavePlanResponse>> {
    let draft: PlanDraft =
        serde_json::from_value(body).map_err(|e| AppError::InvalidPlan(e.to_string()))?;

    let result = state.plans.save_plan(&user.user_id, draft).await?;

    Ok(Json(SavePlanResponse {
        success: true,
        message: format!(
            "Training plan saved successfully! {} weeks stored.",
            result.weeks_saved
        ),
        goal: result.goal,
        weeks_saved: result.weeks_saved,
    }))
}

#[derive(Deserialize)]
struct PlanQuery {
    /// Monday of the requested week; defaults to the current week
    #[serde(alias = "week_start_date")]
    week_start: Option<String>,
}

/// One week of a plan, or a not-found marker for that week.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(feature = "binding-generation", ts(export, export_to = "bindings/"))]
pub struct PlanResponse {
    pub found: bool,
    pub week_start: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[cfg_attr(
        feature = "binding-generation",
        ts(type = "Array<Record<string, unknown>> | null")
    )]
    pub workouts: Option<Vec<Workout>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Get one week of the caller's plan.
async fn get_plan(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<PlanQuery>,
) -> Result<Json<PlanResponse>> {
    let week_start = match query.week_start.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => Some(parse_week_start(raw)?),
        _ => None,
    };

    let response = match state.plans.get_plan(&user.user_id, week_start).await? {
        PlanLookup::Found(week) => PlanResponse {
            found: true,
            week_start: week.week_start_date.to_string(),
            goal: Some(week.goal),
            created_at: Some(week.created_at.to_string()),
            workouts: Some(week.workouts),
            message: None,
        },
        PlanLookup::NotFound { week_start } => PlanResponse {
            found: false,
            week_start: week_start.to_string(),
            goal: None,
            created_at: None,
            workouts: None,
            message: Some(format!("No training plan found for week of {}", week_start)),
        },
    };

    Ok(Json(response))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(feature = "binding-generation", ts(export, export_to = "bindings/"))]
pub struct UpdateWorkoutResponse {
    pub success: bool,
    pub message: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "Record<string, unknown>"))]
    pub updated_workout: Workout,
}

/// Patch one workout; the body is a JSON object of fields to overwrite.
async fn update_workout(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((week_start, day)): Path<(String, String)>,
    Json(patch): Json<serde_json::Value>,
) -> Result<Json<UpdateWorkoutResponse>> {
    let week_start = parse_week_start(&week_start)?;
    let day: Weekday = day.parse().map_err(AppError::BadRequest)?;

    let updated_workout = state
        .plans
        .update_workout(&user.user_id, week_start, day, patch)
        .await?;

    Ok(Json(UpdateWorkoutResponse {
        success: true,
        message: format!(
            "Workout updated successfully for {}, week of {}",
            day, week_start
        ),
        updated_workout,
    }))
}
