//! Database layer (Firestore, with an in-memory backend for local runs).

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryDb;

use crate::error::AppError;
use crate::models::{Credential, TrainingPlanWeek};
use async_trait::async_trait;
use chrono::NaiveDate;

/// Collection names as constants.
pub mod collections {
    /// OAuth credentials (keyed by user_id)
    pub const CREDENTIALS: &str = "credentials";
    /// One document per (user_id, week_start_date)
    pub const TRAINING_PLANS: &str = "training_plans";
}

/// Durable per-user OAuth credential records.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_credential(&self, user_id: &str) -> Result<Option<Credential>, AppError>;

    /// Unconditional write, used when a credential is created out of band.
    async fn put_credential(&self, credential: &Credential) -> Result<(), AppError>;

    /// Write `credential` only if it supersedes the stored one.
    ///
    /// Returns `false` when the stored credential expires later, or expires at
    /// the same time with the same refresh token; nothing is written then.
    async fn update_credential_if_newer(&self, credential: &Credential)
        -> Result<bool, AppError>;
}

/// True if `candidate` should replace `stored`.
///
/// A later expiry always wins. An equal expiry wins only with a rotated
/// refresh token, since the provider may hand back the same expiry while
/// consuming the old token.
pub fn supersedes(candidate: &Credential, stored: &Credential) -> bool {
    candidate.expires_at > stored.expires_at
        || (candidate.expires_at == stored.expires_at
            && candidate.refresh_token != stored.refresh_token)
}

/// Durable per-(user, week) training plan documents.
#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn get_week(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> Result<Option<TrainingPlanWeek>, AppError>;

    /// Replace the whole week document and bump its version.
    ///
    /// With `expected_version`, the write happens only if the stored document
    /// still carries that version. Returns the new version, or `None` on a
    /// version conflict.
    async fn write_week(
        &self,
        week: &TrainingPlanWeek,
        expected_version: Option<u64>,
    ) -> Result<Option<u64>, AppError>;
}

/// Document ID for a plan week. User IDs are URL-encoded so they cannot
/// contain path separators.
pub fn plan_document_id(user_id: &str, week_start: NaiveDate) -> String {
    format!("{}_{}", urlencoding::encode(user_id), week_start)
}

/// Document ID for a credential.
pub fn credential_document_id(user_id: &str) -> String {
    urlencoding::encode(user_id).into_owned()
}
