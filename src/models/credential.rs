// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Stored Google Analytics OAuth credential, one per user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::GOOGLE_TOKEN_URL;

/// Google Analytics OAuth credential stored in the `ga_credentials` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaCredential {
    /// Username of the owning user (also used as document ID)
    pub owner: String,
    pub access_token: String,
    pub refresh_token: String,
    /// Endpoint used to refresh the access token
    #[serde(default = "default_token_endpoint")]
    pub token_endpoint: String,
    pub client_id: String,
    pub client_secret: String,
    /// Granted OAuth scopes, in the order the provider returned them
    #[serde(default)]
    pub granted_scopes: Vec<String>,
    /// Access token expiry; `None` is treated as already expired
    pub expiry: Option<DateTime<Utc>>,
    pub selected_property_id: Option<String>,
    pub selected_property_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_token_endpoint() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

impl GaCredential {
    /// True if the access token must be refreshed before use.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => now >= expiry,
            None => true,
        }
    }

    /// True if both tokens are present.
    pub fn has_tokens(&self) -> bool {
        !self.access_token.is_empty() && !self.refresh_token.is_empty()
    }
}
