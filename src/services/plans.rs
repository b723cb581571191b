// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Training plan service.
//!
//! Handles:
//! - Saving a full plan (one document per week)
//! - Fetching a week, defaulting to the current ISO week
//! - Field-level patches to a single workout inside a week

use crate::db::PlanStore;
use crate::error::{AppError, Result};
use crate::models::{PlanDraft, TrainingPlanWeek, Weekday, Workout, WorkoutPatch, DEFAULT_GOAL};
use crate::services::{bounded, store_context};
use crate::time_utils::{current_week_start, format_utc_rfc3339, parse_iso_date};
use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use futures_util::{stream, StreamExt};
use std::sync::Arc;
use tokio::sync::Mutex;
use validator::Validate;

/// Read-merge-write attempts before a contended update gives up.
const MAX_UPDATE_ATTEMPTS: usize = 3;
const MAX_CONCURRENT_WEEK_WRITES: usize = 8;

/// Shared per-(user, week) write locks.
pub type PlanLocks = Arc<DashMap<(String, NaiveDate), Arc<Mutex<()>>>>;

/// Result of looking up one week.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanLookup {
    Found(TrainingPlanWeek),
    /// No document for this exact week
    NotFound { week_start: NaiveDate },
}

/// Outcome of saving a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavePlanResult {
    pub goal: String,
    /// Weeks actually written (weeks without a start date are skipped)
    pub weeks_saved: usize,
}

/// Stores and patches weekly training plans.
#[derive(Clone)]
pub struct PlanService {
    store: Arc<dyn PlanStore>,
    locks: PlanLocks,
    store_timeout: std::time::Duration,
}

impl PlanService {
    pub fn new(store: Arc<dyn PlanStore>, locks: PlanLocks, store_timeout: std::time::Duration) -> Self {
        Self {
            store,
            locks,
            store_timeout,
        }
    }

    fn lock_for(&self, key: &(String, NaiveDate)) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the lock entry for `key` once no task holds or awaits it.
    fn release_lock(&self, key: &(String, NaiveDate), lock: Arc<Mutex<()>>) {
        drop(lock);
        self.locks
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Save every week of `draft`, replacing existing documents.
    ///
    /// All weeks are validated before the first write. Each week is then an
    /// independent write, so a store failure part-way leaves earlier weeks
    /// saved; the error reports how many made it.
    pub async fn save_plan(&self, user_id: &str, draft: PlanDraft) -> Result<SavePlanResult> {
        draft
            .validate()
            .map_err(|e| AppError::InvalidPlan(e.to_string()))?;

        let goal = draft
            .goal
            .filter(|g| !g.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_GOAL.to_string());

        let created_at = match non_blank(draft.created_at.as_deref()) {
            Some(raw) => parse_iso_date(raw).ok_or_else(|| {
                AppError::InvalidPlan(format!("created_at '{}' is not a YYYY-MM-DD date", raw))
            })?,
            None => Utc::now().date_naive(),
        };

        let updated_at = format_utc_rfc3339(Utc::now());
        let mut weeks = Vec::with_capacity(draft.weeks.len());

        for (index, week) in draft.weeks.into_iter().enumerate() {
            let Some(raw) = non_blank(week.week_start.as_deref()) else {
                tracing::debug!(user_id, index, "Skipping week without week_start");
                continue;
            };
            let week_start_date = parse_iso_date(raw).ok_or_else(|| {
                AppError::InvalidPlan(format!(
                    "week {}: week_start '{}' is not a YYYY-MM-DD date",
                    index, raw
                ))
            })?;

            let week = TrainingPlanWeek {
                user_id: user_id.to_string(),
                week_start_date,
                goal: goal.clone(),
                created_at,
                workouts: week.workouts,
                version: 0,
                updated_at: updated_at.clone(),
            };

            let duplicates = week.duplicate_days();
            if !duplicates.is_empty() {
                tracing::warn!(
                    user_id,
                    week_start = %week_start_date,
                    days = ?duplicates,
                    "Week has more than one workout on the same day; updates will hit the first"
                );
            }

            weeks.push(week);
        }

        let total = weeks.len();
        let results: Vec<(NaiveDate, Result<()>)> = stream::iter(weeks)
            .map(|week| async move {
                let week_start = week.week_start_date;
                (week_start, self.replace_week(&week).await)
            })
            .buffered(MAX_CONCURRENT_WEEK_WRITES)
            .collect()
            .await;

        let weeks_saved = results.iter().filter(|(_, r)| r.is_ok()).count();

        if let Some((week_start, Err(err))) = results.into_iter().find(|(_, r)| r.is_err()) {
            tracing::error!(
                user_id,
                week_start = %week_start,
                weeks_saved,
                total,
                error = %err,
                "Training plan partially saved"
            );
            return Err(store_context(
                err,
                format_args!(
                    "saving week of {} for user {} ({} of {} weeks written)",
                    week_start, user_id, weeks_saved, total
                ),
            ));
        }

        tracing::info!(user_id, goal = %goal, weeks_saved, "Training plan saved");

        Ok(SavePlanResult { goal, weeks_saved })
    }

    async fn replace_week(&self, week: &TrainingPlanWeek) -> Result<()> {
        let key = (week.user_id.clone(), week.week_start_date);
        let lock = self.lock_for(&key);

        let written = {
            let _guard = lock.lock().await;
            bounded(
                self.store_timeout,
                "Plan write",
                self.store.write_week(week, None),
            )
            .await
        };

        self.release_lock(&key, lock);
        written.map(|_| ())
    }

    /// Fetch the plan for `week_start`, or for the current ISO week if omitted.
    pub async fn get_plan(
        &self,
        user_id: &str,
        week_start: Option<NaiveDate>,
    ) -> Result<PlanLookup> {
        let week_start = week_start.unwrap_or_else(current_week_start);

        let week = bounded(
            self.store_timeout,
            "Plan read",
            self.store.get_week(user_id, week_start),
        )
        .await?;

        Ok(match week {
            Some(week) => PlanLookup::Found(week),
            None => PlanLookup::NotFound { week_start },
        })
    }

    /// Merge `patch` into the first workout on `day` and persist the week.
    ///
    /// The patch is checked before anything is read or written. The merge
    /// runs on its own task, so an abandoned request still finishes it.
    pub async fn update_workout(
        &self,
        user_id: &str,
        week_start: NaiveDate,
        day: Weekday,
        patch: serde_json::Value,
    ) -> Result<Workout> {
        let patch = WorkoutPatch::try_from(patch)?;

        let service = self.clone();
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            service
                .merge_serialized(&user_id, week_start, day, &patch)
                .await
        })
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Workout update task failed: {}", e)))?
    }

    async fn merge_serialized(
        &self,
        user_id: &str,
        week_start: NaiveDate,
        day: Weekday,
        patch: &WorkoutPatch,
    ) -> Result<Workout> {
        let key = (user_id.to_string(), week_start);
        let lock = self.lock_for(&key);

        let merged = {
            let _guard = lock.lock().await;
            self.merge_locked(user_id, week_start, day, patch).await
        };

        self.release_lock(&key, lock);
        merged.map_err(|err| {
            store_context(
                err,
                format_args!(
                    "updating {} in week of {} for user {}",
                    day, week_start, user_id
                ),
            )
        })
    }

    async fn merge_locked(
        &self,
        user_id: &str,
        week_start: NaiveDate,
        day: Weekday,
        patch: &WorkoutPatch,
    ) -> Result<Workout> {
        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let mut week = bounded(
                self.store_timeout,
                "Plan read",
                self.store.get_week(user_id, week_start),
            )
            .await?
            .ok_or_else(|| AppError::PlanNotFound {
                user_id: user_id.to_string(),
                week_start,
            })?;

            let index = week
                .position_of(day)
                .ok_or_else(|| AppError::WorkoutNotFound {
                    user_id: user_id.to_string(),
                    week_start,
                    day,
                })?;

            let updated = week.workouts[index].apply_patch(patch)?;
            week.workouts[index] = updated.clone();
            week.updated_at = format_utc_rfc3339(Utc::now());

            let written = bounded(
                self.store_timeout,
                "Plan write",
                self.store.write_week(&week, Some(week.version)),
            )
            .await?;

            match written {
                Some(version) => {
                    let fields: Vec<&str> = patch.fields().collect();
                    tracing::info!(
                        user_id,
                        week_start = %week_start,
                        day = %day,
                        fields = ?fields,
                        version,
                        "Workout updated"
                    );
                    return Ok(updated);
                }
                None => {
                    tracing::warn!(
                        user_id,
                        week_start = %week_start,
                        day = %day,
                        attempt,
                        "Plan week changed during update, retrying"
                    );
                }
            }
        }

        Err(AppError::StoreUnavailable(format!(
            "week kept changing; gave up after {} attempts",
            MAX_UPDATE_ATTEMPTS
        )))
    }
}

fn non_blank(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}
