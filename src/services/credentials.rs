// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth credential lifecycle.
//!
//! Hands out credentials that stay valid for at least the refresh margin,
//! refreshing and persisting them first when they are about to expire.

use crate::db::CredentialStore;
use crate::error::{AppError, Result};
use crate::models::Credential;
use crate::services::{bounded, store_context};
use crate::services::strava::{RefreshError, TokenRefresher};
use crate::time_utils::format_utc_rfc3339;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared refresh locks type for use in AppState.
pub type RefreshLocks = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// Returns currently valid credentials, refreshing them when near expiry.
///
/// Refreshes are serialized per user by an in-process lock and, across
/// instances, by a store write that rejects out-of-order expiry.
#[derive(Clone)]
pub struct CredentialManager {
    store: Arc<dyn CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    /// Per-user mutex to serialize token refresh operations.
    refresh_locks: RefreshLocks,
    margin: Duration,
    store_timeout: std::time::Duration,
    refresh_timeout: std::time::Duration,
}

impl CredentialManager {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        refresher: Arc<dyn TokenRefresher>,
        refresh_locks: RefreshLocks,
        margin: Duration,
        store_timeout: std::time::Duration,
        refresh_timeout: std::time::Duration,
    ) -> Self {
        Self {
            store,
            refresher,
            refresh_locks,
            margin,
            store_timeout,
            refresh_timeout,
        }
    }

    /// Get a credential for `user_id` that is valid for at least the margin.
    ///
    /// Performs at most one refresh call and one store write. On refresh
    /// failure the stored credential is left as it was.
    pub async fn get_valid_credential(&self, user_id: &str) -> Result<Credential> {
        let credential = self.load(user_id).await?;

        if credential.is_valid_at(Utc::now(), self.margin) {
            return Ok(credential);
        }

        tracing::info!(
            user_id,
            expires_at = credential.expires_at,
            "Credential expiring, refreshing"
        );

        // Runs on its own task so a dropped request cannot stop between the
        // token exchange and the store write.
        let manager = self.clone();
        let user_id = user_id.to_string();
        tokio::spawn(async move { manager.refresh_serialized(&user_id).await })
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Refresh task failed: {}", e)))?
    }

    async fn load(&self, user_id: &str) -> Result<Credential> {
        bounded(
            self.store_timeout,
            "Credential read",
            self.store.get_credential(user_id),
        )
        .await
        .map_err(|err| store_context(err, format_args!("loading credential for user {}", user_id)))?
        .ok_or_else(|| AppError::NotFound(format!("Credential for user {}", user_id)))
    }

    async fn refresh_serialized(&self, user_id: &str) -> Result<Credential> {
        let lock = self
            .refresh_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let _guard = lock.lock().await;

        // Another task may have refreshed while we were waiting.
        let stale = self.load(user_id).await?;
        if stale.is_valid_at(Utc::now(), self.margin) {
            tracing::debug!(user_id, "Credential already refreshed by another task");
            return Ok(stale);
        }

        let refreshed = tokio::time::timeout(
            self.refresh_timeout,
            self.refresher.refresh(&stale.refresh_token),
        )
        .await
        .unwrap_or(Err(RefreshError::Timeout));

        let tokens = match refreshed {
            Ok(tokens) => tokens,
            Err(err) => return self.recover_failed_refresh(user_id, err).await,
        };

        let now = Utc::now();
        let fresh = Credential {
            user_id: user_id.to_string(),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at: tokens.expires_at,
            updated_at: Some(format_utc_rfc3339(now)),
        };

        // Persist even a short-lived pair: the old refresh token is spent.
        let written = bounded(
            self.store_timeout,
            "Credential write",
            self.store.update_credential_if_newer(&fresh),
        )
        .await
        .map_err(|err| {
            store_context(
                err,
                format_args!("storing refreshed credential for user {}", user_id),
            )
        })?;

        let current = if written {
            tracing::info!(user_id, expires_at = fresh.expires_at, "Credential refreshed and stored");
            fresh
        } else {
            tracing::info!(
                user_id,
                "Newer credential already stored by another instance, using it"
            );
            self.load(user_id).await?
        };

        if !current.is_valid_at(Utc::now(), self.margin) {
            tracing::warn!(
                user_id,
                expires_at = current.expires_at,
                "Refreshed credential expires within the refresh margin"
            );
            return Err(AppError::CredentialRefresh {
                user_id: user_id.to_string(),
                status: None,
                reason: format!(
                    "refreshed credential expires at {}, inside the {}s refresh margin",
                    current.expires_at,
                    self.margin.num_seconds()
                ),
            });
        }

        Ok(current)
    }

    /// Turn a failed refresh into an error, unless another instance won the
    /// race and already stored a valid credential.
    ///
    /// Providers invalidate a refresh token on first use, so the loser of a
    /// cross-instance race sees a rejection even though a fresh pair exists.
    async fn recover_failed_refresh(
        &self,
        user_id: &str,
        err: RefreshError,
    ) -> Result<Credential> {
        tracing::warn!(
            user_id,
            status = ?err.status(),
            error = %err,
            "Credential refresh failed"
        );

        if let Ok(current) = self.load(user_id).await {
            if current.is_valid_at(Utc::now(), self.margin) {
                tracing::info!(user_id, "Refresh race lost, using credential stored by winner");
                return Ok(current);
            }
        }

        Err(AppError::CredentialRefresh {
            user_id: user_id.to_string(),
            status: err.status(),
            reason: err.to_string(),
        })
    }
}
