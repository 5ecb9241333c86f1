// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod client_secrets;
pub mod google;
pub mod oauth_state;
pub mod password;

pub use client_secrets::ClientSecrets;
pub use google::{Connection, GoogleAnalyticsService, GoogleClient};
