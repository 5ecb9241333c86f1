// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! InsightDash: account sessions and per-user Google Analytics connections
//!
//! This crate provides the backend API for username/password accounts,
//! the Google OAuth consent flow, stored credential refresh and GA4
//! property listing.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use db::Db;
use services::GoogleAnalyticsService;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Db,
    pub google: GoogleAnalyticsService,
}
