// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory store backend.
//!
//! Same conditional-write semantics as the Firestore backend, kept in
//! process-local maps. Used with `STORE_BACKEND=memory` and by the tests.

use super::{supersedes, CredentialStore, PlanStore};
use crate::error::AppError;
use crate::models::{Credential, TrainingPlanWeek};
use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Process-local credential and plan store.
#[derive(Clone, Default)]
pub struct MemoryDb {
    credentials: Arc<DashMap<String, Credential>>,
    plans: Arc<DashMap<(String, NaiveDate), TrainingPlanWeek>>,
    /// Successful writes across both collections
    writes: Arc<AtomicUsize>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of writes that have been applied.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CredentialStore for MemoryDb {
    async fn get_credential(&self, user_id: &str) -> Result<Option<Credential>, AppError> {
        Ok(self.credentials.get(user_id).map(|c| c.clone()))
    }

    async fn put_credential(&self, credential: &Credential) -> Result<(), AppError> {
        self.credentials
            .insert(credential.user_id.clone(), credential.clone());
        self.record_write();
        Ok(())
    }

    async fn update_credential_if_newer(
        &self,
        credential: &Credential,
    ) -> Result<bool, AppError> {
        match self.credentials.entry(credential.user_id.clone()) {
            Entry::Occupied(mut entry) => {
                if !supersedes(credential, entry.get()) {
                    return Ok(false);
                }
                entry.insert(credential.clone());
            }
            Entry::Vacant(entry) => {
                entry.insert(credential.clone());
            }
        }
        self.record_write();
        Ok(true)
    }
}

#[async_trait]
impl PlanStore for MemoryDb {
    async fn get_week(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> Result<Option<TrainingPlanWeek>, AppError> {
        Ok(self
            .plans
            .get(&(user_id.to_string(), week_start))
            .map(|w| w.clone()))
    }

    async fn write_week(
        &self,
        week: &TrainingPlanWeek,
        expected_version: Option<u64>,
    ) -> Result<Option<u64>, AppError> {
        let key = (week.user_id.clone(), week.week_start_date);

        let new_version = match self.plans.entry(key) {
            Entry::Occupied(mut entry) => {
                let current = entry.get().version;
                if expected_version.is_some_and(|v| v != current) {
                    return Ok(None);
                }
                let mut stored = week.clone();
                stored.version = current + 1;
                entry.insert(stored);
                current + 1
            }
            Entry::Vacant(entry) => {
                if expected_version.is_some() {
                    return Ok(None);
                }
                let mut stored = week.clone();
                stored.version = 1;
                entry.insert(stored);
                1
            }
        };

        self.record_write();
        Ok(Some(new_version))
    }
}
