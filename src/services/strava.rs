// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava OAuth token endpoint client.
//!
//! Exchanges a refresh token for a new access/refresh pair. Any non-success
//! response is a failure; retry policy belongs to the caller.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Longest slice of an error body carried into diagnostics.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Token triple returned by a successful refresh grant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RefreshedTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Absolute expiry (Unix seconds)
    pub expires_at: i64,
}

/// Why a refresh grant failed.
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("token endpoint returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("token refresh request failed: {0}")]
    Transport(String),

    #[error("token refresh timed out")]
    Timeout,

    #[error("token endpoint returned an unreadable body: {0}")]
    Malformed(String),
}

impl RefreshError {
    /// HTTP status returned by the endpoint, if it answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            RefreshError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Exchanges refresh tokens for fresh credentials.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, RefreshError>;
}

/// Refresh grants against the Strava OAuth token endpoint.
#[derive(Clone)]
pub struct StravaTokenRefresher {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl StravaTokenRefresher {
    /// Create a refresher with OAuth client credentials; every request is
    /// bounded by `timeout`.
    pub fn new(
        token_url: String,
        client_id: String,
        client_secret: String,
        timeout: Duration,
    ) -> Result<Self, RefreshError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            token_url,
            client_id,
            client_secret,
        })
    }
}

#[async_trait]
impl TokenRefresher for StravaTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, RefreshError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RefreshError::Timeout
                } else {
                    RefreshError::Transport(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(MAX_ERROR_BODY_CHARS)
                .collect();

            if status == 429 {
                tracing::warn!("Strava rate limit hit (429) on token refresh");
            }
            return Err(RefreshError::Rejected { status, body });
        }

        response
            .json()
            .await
            .map_err(|e| RefreshError::Malformed(e.to_string()))
    }
}
