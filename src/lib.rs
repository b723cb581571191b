// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! VRC Coach: durable state behind an AI running coach
//!
//! This crate keeps athletes' Strava OAuth credentials fresh and stores
//! their weekly training plans, with field-level workout updates.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use services::{CredentialManager, PlanService};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub credentials: CredentialManager,
    pub plans: PlanService,
}
