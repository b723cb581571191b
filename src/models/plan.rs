// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Weekly training plan documents and workout records.
//!
//! A plan is stored as one document per (user, week). Workouts inside a week
//! are keyed by their weekday and are updated through field-level patches.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use validator::Validate;

use crate::error::AppError;

/// Goal used when a saved plan does not name one.
pub const DEFAULT_GOAL: &str = "Training Plan";

/// Alternate spellings accepted for workout fields, mapped to stored names.
const FIELD_ALIASES: &[(&str, &str)] = &[
    ("workoutType", "type"),
    ("workout_type", "type"),
    ("targetPace", "target_pace"),
    ("targetHr", "target_hr"),
    ("actualDistance", "actual_distance"),
    ("actualPace", "actual_pace"),
    ("actualHr", "actual_hr"),
    ("activityId", "activity_id"),
    ("aiSummary", "ai_summary"),
];

// ─── Weekday ─────────────────────────────────────────────────────────────────

/// Day of the week a workout is scheduled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub fn name(self) -> &'static str {
        match self {
            Weekday::Monday => "Monday",
            Weekday::Tuesday => "Tuesday",
            Weekday::Wednesday => "Wednesday",
            Weekday::Thursday => "Thursday",
            Weekday::Friday => "Friday",
            Weekday::Saturday => "Saturday",
            Weekday::Sunday => "Sunday",
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Weekday {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monday" => Ok(Weekday::Monday),
            "tuesday" => Ok(Weekday::Tuesday),
            "wednesday" => Ok(Weekday::Wednesday),
            "thursday" => Ok(Weekday::Thursday),
            "friday" => Ok(Weekday::Friday),
            "saturday" => Ok(Weekday::Saturday),
            "sunday" => Ok(Weekday::Sunday),
            _ => Err(format!("unknown weekday '{}'", s)),
        }
    }
}

impl<'de> Deserialize<'de> for Weekday {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

// ─── Workout ─────────────────────────────────────────────────────────────────

/// A measurement callers send either as a number or as descriptive text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Measure {
    Number(f64),
    Text(String),
}

/// One scheduled workout inside a week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workout {
    pub day: Weekday,
    #[serde(
        rename = "type",
        alias = "workoutType",
        alias = "workout_type",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub workout_type: Option<String>,
    /// Planned distance (unit chosen by the plan author)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(alias = "targetPace", default, skip_serializing_if = "Option::is_none")]
    pub target_pace: Option<String>,
    #[serde(alias = "targetHr", default, skip_serializing_if = "Option::is_none")]
    pub target_hr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(alias = "actualDistance", default, skip_serializing_if = "Option::is_none")]
    pub actual_distance: Option<f64>,
    #[serde(alias = "actualPace", default, skip_serializing_if = "Option::is_none")]
    pub actual_pace: Option<String>,
    #[serde(alias = "actualHr", default, skip_serializing_if = "Option::is_none")]
    pub actual_hr: Option<Measure>,
    /// Matched external activity
    #[serde(
        alias = "activityId",
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub activity_id: Option<String>,
    #[serde(alias = "aiSummary", default, skip_serializing_if = "Option::is_none")]
    pub ai_summary: Option<String>,
    /// Caller-supplied fields without a typed counterpart, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Workout {
    /// A bare workout for `day` with every optional field unset.
    pub fn new(day: Weekday) -> Self {
        Self {
            day,
            workout_type: None,
            distance: None,
            target_pace: None,
            target_hr: None,
            notes: None,
            completed: false,
            actual_distance: None,
            actual_pace: None,
            actual_hr: None,
            activity_id: None,
            ai_summary: None,
            extra: Map::new(),
        }
    }

    /// Merge `patch` onto a copy of this workout.
    ///
    /// Keys present in the patch overwrite, absent keys are untouched and
    /// `null` clears an optional field. The result is re-validated as a whole,
    /// so a value of the wrong type rejects the entire patch.
    pub fn apply_patch(&self, patch: &WorkoutPatch) -> Result<Workout, AppError> {
        let Value::Object(mut merged) = serde_json::to_value(self)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Workout serialization: {}", e)))?
        else {
            return Err(AppError::Internal(anyhow::anyhow!(
                "Workout did not serialize to an object"
            )));
        };

        for (key, value) in &patch.0 {
            merged.insert(key.clone(), value.clone());
        }

        serde_json::from_value(Value::Object(merged))
            .map_err(|e| AppError::InvalidPatch(e.to_string()))
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

// ─── Patch ───────────────────────────────────────────────────────────────────

/// A partial set of workout fields, validated to be a JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkoutPatch(Map<String, Value>);

impl WorkoutPatch {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Field names carried by the patch, in stored spelling.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl TryFrom<Value> for WorkoutPatch {
    type Error = AppError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(fields) = value else {
            return Err(AppError::InvalidPatch(format!(
                "patch must be a JSON object, got {}",
                json_kind(&value)
            )));
        };

        let mut normalized = Map::with_capacity(fields.len());
        for (key, value) in fields {
            let key = FIELD_ALIASES
                .iter()
                .find(|(alias, _)| *alias == key)
                .map(|(_, canonical)| canonical.to_string())
                .unwrap_or(key);
            if normalized.insert(key.clone(), value).is_some() {
                return Err(AppError::InvalidPatch(format!(
                    "field '{}' given more than once",
                    key
                )));
            }
        }

        Ok(Self(normalized))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ─── Week document ───────────────────────────────────────────────────────────

/// One week of a user's plan, stored as a single document.
///
/// `goal` and `created_at` are copied into every week of a plan so each
/// document stands on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingPlanWeek {
    pub user_id: String,
    pub week_start_date: NaiveDate,
    pub goal: String,
    pub created_at: NaiveDate,
    /// In insertion order; never re-sorted
    pub workouts: Vec<Workout>,
    /// Bumped by the store on every write
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub updated_at: String,
}

impl TrainingPlanWeek {
    /// Index of the first workout scheduled on `day`.
    pub fn position_of(&self, day: Weekday) -> Option<usize> {
        self.workouts.iter().position(|w| w.day == day)
    }

    /// Days that appear on more than one workout.
    pub fn duplicate_days(&self) -> Vec<Weekday> {
        let mut seen = Vec::with_capacity(self.workouts.len());
        let mut duplicates = Vec::new();
        for workout in &self.workouts {
            if seen.contains(&workout.day) {
                if !duplicates.contains(&workout.day) {
                    duplicates.push(workout.day);
                }
            } else {
                seen.push(workout.day);
            }
        }
        duplicates
    }
}

// ─── Save input ──────────────────────────────────────────────────────────────

/// A full plan as submitted for saving.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PlanDraft {
    #[serde(default)]
    #[validate(length(max = 500, message = "goal must be at most 500 characters"))]
    pub goal: Option<String>,
    /// Plan creation date (`YYYY-MM-DD`), defaults to today
    #[serde(default)]
    pub created_at: Option<String>,
    #[validate(length(min = 1, message = "missing weeks array"))]
    pub weeks: Vec<WeekDraft>,
}

/// One week of a submitted plan. Weeks without a start date are skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeekDraft {
    #[serde(default, alias = "week_start_date", alias = "weekStartDate")]
    pub week_start: Option<String>,
    #[serde(default)]
    pub workouts: Vec<Workout>,
}
