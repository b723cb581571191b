//! OAuth credential model for storage.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A user's third-party OAuth credential pair, stored keyed by `user_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Stable user identifier (also used as document ID)
    pub user_id: String,
    /// Bearer token for API calls
    pub access_token: String,
    /// Single-use token exchanged for a new pair
    pub refresh_token: String,
    /// When the access token expires (Unix seconds)
    pub expires_at: i64,
    /// Last write timestamp (RFC 3339), absent for credentials seeded out of band
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Credential {
    /// True if the access token is still good for at least `margin` past `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at >= (now + margin).timestamp()
    }
}
