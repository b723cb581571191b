// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vrc_coach::config::Config;
use vrc_coach::db::{CredentialStore, FirestoreDb, MemoryDb, PlanStore};
use vrc_coach::error::AppError;
use vrc_coach::models::{Credential, TrainingPlanWeek};
use vrc_coach::routes::create_router;
use vrc_coach::services::{
    CredentialManager, PlanService, RefreshError, RefreshedTokens, TokenRefresher,
};
use vrc_coach::AppState;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Generate a unique user ID for test isolation.
#[allow(dead_code)]
pub fn unique_user_id(prefix: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{}-{}", prefix, nanos)
}

/// Token refresher that answers from a script and counts calls.
#[allow(dead_code)]
pub struct FakeRefresher {
    calls: AtomicUsize,
    outcome: Mutex<Result<RefreshedTokens, (u16, String)>>,
    delay: Duration,
    seen_tokens: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl FakeRefresher {
    /// Every call succeeds with tokens valid for `valid_for_secs` from now.
    pub fn succeeding(access_token: &str, valid_for_secs: i64) -> Self {
        Self::with_outcome(Ok(RefreshedTokens {
            access_token: access_token.to_string(),
            refresh_token: format!("{}_refresh", access_token),
            expires_at: Utc::now().timestamp() + valid_for_secs,
        }))
    }

    /// Every call is rejected by the endpoint with `status`.
    pub fn rejecting(status: u16) -> Self {
        Self::with_outcome(Err((status, "invalid_grant".to_string())))
    }

    /// Every call succeeds with exactly `tokens`.
    pub fn returning(tokens: RefreshedTokens) -> Self {
        Self::with_outcome(Ok(tokens))
    }

    fn with_outcome(outcome: Result<RefreshedTokens, (u16, String)>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            outcome: Mutex::new(outcome),
            delay: Duration::ZERO,
            seen_tokens: Mutex::new(Vec::new()),
        }
    }

    /// Hold each call open for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_tokens(&self) -> Vec<String> {
        self.seen_tokens.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenRefresher for FakeRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, RefreshError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_tokens
            .lock()
            .unwrap()
            .push(refresh_token.to_string());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let outcome = self.outcome.lock().unwrap().clone();
        outcome.map_err(|(status, body)| RefreshError::Rejected { status, body })
    }
}

/// A credential for `user_id` expiring `expires_in_secs` from now.
#[allow(dead_code)]
pub fn credential(user_id: &str, access_token: &str, expires_in_secs: i64) -> Credential {
    Credential {
        user_id: user_id.to_string(),
        access_token: access_token.to_string(),
        refresh_token: format!("{}_refresh", access_token),
        expires_at: Utc::now().timestamp() + expires_in_secs,
        updated_at: None,
    }
}

/// Store a credential directly, bypassing the manager.
#[allow(dead_code)]
pub async fn seed_credential(db: &MemoryDb, credential: &Credential) {
    db.put_credential(credential)
        .await
        .expect("Failed to seed credential");
}

/// A credential manager over `db` with the production refresh margin.
#[allow(dead_code)]
pub fn credential_manager(db: &MemoryDb, refresher: Arc<FakeRefresher>) -> CredentialManager {
    let config = Config::default();
    CredentialManager::new(
        Arc::new(db.clone()),
        refresher,
        Arc::new(dashmap::DashMap::new()),
        config.token_refresh_margin,
        config.store_timeout,
        config.http_timeout,
    )
}

/// A plan service over `db`.
#[allow(dead_code)]
pub fn plan_service(db: &MemoryDb) -> PlanService {
    plan_service_over(Arc::new(db.clone()))
}

/// A plan service over any plan store.
#[allow(dead_code)]
pub fn plan_service_over(store: Arc<dyn PlanStore>) -> PlanService {
    PlanService::new(
        store,
        Arc::new(dashmap::DashMap::new()),
        Config::default().store_timeout,
    )
}

/// How a `FaultyPlanStore` misbehaves on writes.
#[allow(dead_code)]
pub enum WriteFault {
    /// Every write to this week fails as if the store were down
    FailWeek(NaiveDate),
    /// Another writer changes the week just before the first conditional write
    ConflictOnce,
    /// Every conditional write loses to another writer
    AlwaysConflict,
}

/// Plan store over `MemoryDb` that injects write failures and conflicts.
#[allow(dead_code)]
pub struct FaultyPlanStore {
    pub inner: MemoryDb,
    fault: WriteFault,
    conflicted: AtomicBool,
}

#[allow(dead_code)]
impl FaultyPlanStore {
    pub fn new(inner: MemoryDb, fault: WriteFault) -> Self {
        Self {
            inner,
            fault,
            conflicted: AtomicBool::new(false),
        }
    }

    /// Simulate another instance adding notes to the last workout.
    async fn write_from_elsewhere(&self, week: &TrainingPlanWeek) -> Result<(), AppError> {
        let mut other = self
            .inner
            .get_week(&week.user_id, week.week_start_date)
            .await?
            .expect("week must exist before a conditional write");
        if let Some(last) = other.workouts.last_mut() {
            last.notes = Some("other instance".to_string());
        }
        let version = other.version;
        self.inner.write_week(&other, Some(version)).await?;
        Ok(())
    }
}

#[async_trait]
impl PlanStore for FaultyPlanStore {
    async fn get_week(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> Result<Option<TrainingPlanWeek>, AppError> {
        self.inner.get_week(user_id, week_start).await
    }

    async fn write_week(
        &self,
        week: &TrainingPlanWeek,
        expected_version: Option<u64>,
    ) -> Result<Option<u64>, AppError> {
        match self.fault {
            WriteFault::FailWeek(date) if date == week.week_start_date => {
                return Err(AppError::StoreUnavailable("deadline exceeded".to_string()));
            }
            WriteFault::ConflictOnce
                if expected_version.is_some() && !self.conflicted.swap(true, Ordering::SeqCst) =>
            {
                self.write_from_elsewhere(week).await?;
            }
            WriteFault::AlwaysConflict if expected_version.is_some() => {
                return Ok(None);
            }
            _ => {}
        }
        self.inner.write_week(week, expected_version).await
    }
}

/// Everything an API test needs to drive the router.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub db: MemoryDb,
    pub refresher: Arc<FakeRefresher>,
}

/// Create a test app over an in-memory store and a fake token endpoint.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    create_test_app_with(FakeRefresher::succeeding("refreshed_access", 6 * 3600))
}

#[allow(dead_code)]
pub fn create_test_app_with(refresher: FakeRefresher) -> TestApp {
    let config = Config::default();
    let db = MemoryDb::new();
    let refresher = Arc::new(refresher);

    let state = Arc::new(AppState {
        credentials: credential_manager(&db, refresher.clone()),
        plans: plan_service(&db),
        config,
    });

    TestApp {
        router: create_router(state.clone()),
        state,
        db,
        refresher,
    }
}

/// Create a bearer token for `user_id` signed with `signing_key`.
#[allow(dead_code)]
pub fn create_test_jwt(user_id: &str, signing_key: &[u8]) -> String {
    vrc_coach::middleware::auth::create_jwt(user_id, signing_key, 3600)
        .expect("Failed to create test JWT")
}
