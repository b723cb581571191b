// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod credentials;
pub mod plans;
pub mod strava;

pub use credentials::{CredentialManager, RefreshLocks};
pub use plans::{PlanLocks, PlanLookup, PlanService, SavePlanResult};
pub use strava::{RefreshError, RefreshedTokens, StravaTokenRefresher, TokenRefresher};

use crate::error::AppError;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Run a store operation, failing with `StoreUnavailable` if it outlives `limit`.
pub(crate) async fn bounded<T, F>(limit: Duration, what: &str, op: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    tokio::time::timeout(limit, op).await.map_err(|_| {
        AppError::StoreUnavailable(format!("{} timed out after {:?}", what, limit))
    })?
}

/// Prefix a `StoreUnavailable` message with what was being done; other
/// errors pass through.
pub(crate) fn store_context(err: AppError, context: impl Display) -> AppError {
    match err {
        AppError::StoreUnavailable(msg) => {
            AppError::StoreUnavailable(format!("{}: {}", context, msg))
        }
        other => other,
    }
}
