// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides:
//! - Credentials (OAuth pairs, conditional refresh writes)
//! - Training plans (one document per user and week, versioned)

use super::{
    collections, credential_document_id, plan_document_id, supersedes, CredentialStore, PlanStore,
};
use crate::error::AppError;
use crate::models::{Credential, TrainingPlanWeek, Workout};
use crate::time_utils::parse_iso_date;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Stored shape of a plan week. Workouts are kept as a serialized JSON
/// sequence so caller-supplied fields survive untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PlanWeekDocument {
    user_id: String,
    week_start_date: String,
    goal: String,
    created_at: String,
    workouts_json: String,
    #[serde(default)]
    version: u64,
    #[serde(default)]
    updated_at: String,
}

impl PlanWeekDocument {
    fn from_week(week: &TrainingPlanWeek, version: u64) -> Result<Self, AppError> {
        let workouts_json = serde_json::to_string(&week.workouts).map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Failed to serialize workouts: {}", e))
        })?;

        Ok(Self {
            user_id: week.user_id.clone(),
            week_start_date: week.week_start_date.to_string(),
            goal: week.goal.clone(),
            created_at: week.created_at.to_string(),
            workouts_json,
            version,
            updated_at: week.updated_at.clone(),
        })
    }

    fn into_week(self) -> Result<TrainingPlanWeek, AppError> {
        let corrupt = |what: &str| {
            AppError::Internal(anyhow::anyhow!(
                "Corrupt plan document for user {} week {}: {}",
                self.user_id,
                self.week_start_date,
                what
            ))
        };

        let week_start_date =
            parse_iso_date(&self.week_start_date).ok_or_else(|| corrupt("week_start_date"))?;
        let created_at = parse_iso_date(&self.created_at).ok_or_else(|| corrupt("created_at"))?;
        let workouts: Vec<Workout> =
            serde_json::from_str(&self.workouts_json).map_err(|_| corrupt("workouts_json"))?;

        Ok(TrainingPlanWeek {
            user_id: self.user_id,
            week_start_date,
            goal: self.goal,
            created_at,
            workouts,
            version: self.version,
            updated_at: self.updated_at,
        })
    }
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: firestore::FirestoreDb,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id).await.map_err(|e| {
            AppError::StoreUnavailable(format!("Failed to connect to Firestore: {}", e))
        })?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self { client })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::StoreUnavailable(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self { client })
    }

    /// Begin a transaction and a client whose reads see it.
    ///
    /// Reads through the returned client register documents for conflict
    /// detection, so a concurrent writer makes the commit fail.
    async fn begin(
        &self,
    ) -> Result<(firestore::FirestoreTransaction<'_>, firestore::FirestoreDb), AppError> {
        let transaction = self
            .client
            .begin_transaction()
            .await
            .map_err(|e| AppError::StoreUnavailable(format!("Failed to begin transaction: {}", e)))?;

        let reader = self.client.clone_with_consistency_selector(
            firestore::FirestoreConsistencySelector::Transaction(
                transaction.transaction_id().clone(),
            ),
        );

        Ok((transaction, reader))
    }
}

#[async_trait]
impl CredentialStore for FirestoreDb {
    async fn get_credential(&self, user_id: &str) -> Result<Option<Credential>, AppError> {
        self.client
            .fluent()
            .select()
            .by_id_in(collections::CREDENTIALS)
            .obj()
            .one(&credential_document_id(user_id))
            .await
            .map_err(|e| AppError::StoreUnavailable(e.to_string()))
    }

    async fn put_credential(&self, credential: &Credential) -> Result<(), AppError> {
        let _: () = self
            .client
            .fluent()
            .update()
            .in_col(collections::CREDENTIALS)
            .document_id(credential_document_id(&credential.user_id))
            .object(credential)
            .execute()
            .await
            .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn update_credential_if_newer(
        &self,
        credential: &Credential,
    ) -> Result<bool, AppError> {
        let doc_id = credential_document_id(&credential.user_id);
        let (mut transaction, reader) = self.begin().await?;

        let current: Option<Credential> = reader
            .fluent()
            .select()
            .by_id_in(collections::CREDENTIALS)
            .obj()
            .one(&doc_id)
            .await
            .map_err(|e| {
                AppError::StoreUnavailable(format!("Failed to read credential in transaction: {}", e))
            })?;

        if current.is_some_and(|c| !supersedes(credential, &c)) {
            let _ = transaction.rollback().await;
            return Ok(false);
        }

        self.client
            .fluent()
            .update()
            .in_col(collections::CREDENTIALS)
            .document_id(&doc_id)
            .object(credential)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::StoreUnavailable(format!(
                    "Failed to add credential to transaction: {}",
                    e
                ))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::StoreUnavailable(format!("Transaction commit failed: {}", e)))?;

        Ok(true)
    }
}

#[async_trait]
impl PlanStore for FirestoreDb {
    async fn get_week(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> Result<Option<TrainingPlanWeek>, AppError> {
        let doc: Option<PlanWeekDocument> = self
            .client
            .fluent()
            .select()
            .by_id_in(collections::TRAINING_PLANS)
            .obj()
            .one(&plan_document_id(user_id, week_start))
            .await
            .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;

        doc.map(PlanWeekDocument::into_week).transpose()
    }

    async fn write_week(
        &self,
        week: &TrainingPlanWeek,
        expected_version: Option<u64>,
    ) -> Result<Option<u64>, AppError> {
        let doc_id = plan_document_id(&week.user_id, week.week_start_date);
        let (mut transaction, reader) = self.begin().await?;

        let current: Option<PlanWeekDocument> = reader
            .fluent()
            .select()
            .by_id_in(collections::TRAINING_PLANS)
            .obj()
            .one(&doc_id)
            .await
            .map_err(|e| {
                AppError::StoreUnavailable(format!("Failed to read plan in transaction: {}", e))
            })?;

        let current_version = current.map(|doc| doc.version);
        let conflict = match expected_version {
            Some(expected) => current_version != Some(expected),
            None => false,
        };
        if conflict {
            let _ = transaction.rollback().await;
            return Ok(None);
        }

        let new_version = current_version.unwrap_or(0) + 1;
        let doc = PlanWeekDocument::from_week(week, new_version)?;

        self.client
            .fluent()
            .update()
            .in_col(collections::TRAINING_PLANS)
            .document_id(&doc_id)
            .object(&doc)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::StoreUnavailable(format!("Failed to add plan to transaction: {}", e))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::StoreUnavailable(format!("Transaction commit failed: {}", e)))?;

        tracing::debug!(
            user_id = %week.user_id,
            week_start = %week.week_start_date,
            version = new_version,
            "Plan week written"
        );

        Ok(Some(new_version))
    }
}
