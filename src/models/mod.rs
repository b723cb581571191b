// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod credential;
pub mod plan;

pub use credential::Credential;
pub use plan::{
    Measure, PlanDraft, TrainingPlanWeek, WeekDraft, Weekday, Workout, WorkoutPatch,
    DEFAULT_GOAL,
};
