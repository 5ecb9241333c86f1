// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google OAuth and Analytics Admin API client.
//!
//! Handles:
//! - Building the consent redirect (offline access, forced re-consent)
//! - Authorization code exchange
//! - Access token refresh against the endpoint stored on each credential
//! - Account summary enumeration (all pages, fetched eagerly)

use crate::config::{is_transport_allowed, Config, GOOGLE_SCOPES};
use crate::error::AppError;
use crate::services::client_secrets::ClientSecrets;
use chrono::{DateTime, TimeDelta};
use serde::Deserialize;
use std::time::Duration;

/// Page size requested from `accountSummaries`.
const ACCOUNT_SUMMARIES_PAGE_SIZE: u32 = 200;

/// Upper bound on pages followed in one listing.
const MAX_ACCOUNT_SUMMARY_PAGES: usize = 50;

/// Google OAuth and Admin API client.
#[derive(Clone)]
pub struct GoogleClient {
    http: reqwest::Client,
    auth_url: String,
    token_url: String,
    admin_url: String,
    redirect_uri: String,
    secrets: ClientSecrets,
    allow_insecure_transport: bool,
}

impl GoogleClient {
    /// Create a client from configuration and the app's client secrets.
    pub fn new(config: &Config, secrets: ClientSecrets) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            auth_url: config.google_auth_url.clone(),
            token_url: config.google_token_url.trim_end_matches('/').to_string(),
            admin_url: config.analytics_admin_url.trim_end_matches('/').to_string(),
            redirect_uri: config.google_redirect_uri.clone(),
            secrets,
            allow_insecure_transport: config.allow_insecure_transport,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.secrets.client_id
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Build the consent-screen URL for the given anti-forgery state.
    pub fn authorization_url(&self, state: &str) -> String {
        format!(
            "{}?\
             response_type=code&\
             client_id={}&\
             redirect_uri={}&\
             scope={}&\
             access_type=offline&\
             prompt=consent&\
             include_granted_scopes=true&\
             state={}",
            self.auth_url,
            urlencoding::encode(&self.secrets.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&GOOGLE_SCOPES.join(" ")),
            urlencoding::encode(state),
        )
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, AppError> {
        self.ensure_transport(&self.token_url)?;

        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("client_id", self.secrets.client_id.as_str()),
                ("client_secret", self.secrets.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::GoogleApi(format!("Token exchange failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Google token exchange failed");
            return Err(AppError::GoogleApi(format!(
                "Token exchange failed with status {}",
                status
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::GoogleApi(format!("Failed to parse token response: {}", e)))
    }

    /// Refresh an access token at `token_endpoint` using the stored client credentials.
    pub async fn refresh_access_token(
        &self,
        token_endpoint: &str,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<TokenResponse, AppError> {
        self.ensure_transport(token_endpoint)?;

        let response = self
            .http
            .post(token_endpoint)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ])
            .send()
            .await
            .map_err(|e| AppError::GoogleApi(format!("Token refresh request failed: {}", e)))?;

        self.check_response_json(response).await
    }

    /// Fetch every account summary visible to the access token.
    pub async fn list_account_summaries(
        &self,
        access_token: &str,
    ) -> Result<Vec<AccountSummary>, AppError> {
        self.ensure_transport(&self.admin_url)?;

        let url = format!("{}/accountSummaries", self.admin_url);
        let mut summaries = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_ACCOUNT_SUMMARY_PAGES {
            let mut query = vec![("pageSize", ACCOUNT_SUMMARIES_PAGE_SIZE.to_string())];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let response = self
                .http
                .get(&url)
                .bearer_auth(access_token)
                .query(&query)
                .send()
                .await
                .map_err(|e| AppError::GoogleApi(e.to_string()))?;

            let page: AccountSummariesPage = self.check_response_json(response).await?;
            summaries.extend(page.account_summaries);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => return Ok(summaries),
            }
        }

        tracing::warn!(
            pages = MAX_ACCOUNT_SUMMARY_PAGES,
            "Stopped following accountSummaries pagination"
        );
        Ok(summaries)
    }

    fn ensure_transport(&self, url: &str) -> Result<(), AppError> {
        if is_transport_allowed(url, self.allow_insecure_transport) {
            Ok(())
        } else {
            Err(AppError::GoogleApi(format!(
                "Refusing insecure transport to {}",
                url
            )))
        }
    }

    /// Check response and parse JSON body.
    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, AppError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                tracing::warn!("Google rate limit hit (429)");
            }

            return Err(AppError::GoogleApi(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::GoogleApi(format!("JSON parse error: {}", e)))
    }
}

/// Token endpoint response (code exchange and refresh).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Only issued on exchange with `access_type=offline`
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Space-separated granted scopes
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Absolute expiry for this token, `None` if absent or out of range.
    pub fn expiry_from(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_in
            .and_then(TimeDelta::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
    }

    /// Granted scopes, or the requested set if the provider omitted them.
    pub fn granted_scopes(&self) -> Vec<String> {
        match self.scope.as_deref() {
            Some(scope) if !scope.trim().is_empty() => {
                scope.split_whitespace().map(String::from).collect()
            }
            _ => GOOGLE_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountSummariesPage {
    #[serde(default)]
    account_summaries: Vec<AccountSummary>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// One Analytics account with its properties.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    /// Resource name, `accounts/<id>`
    pub account: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub property_summaries: Vec<PropertySummary>,
}

/// A GA4 property under an account summary.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertySummary {
    /// Resource name, `properties/<id>`
    pub property: String,
    #[serde(default)]
    pub display_name: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// GoogleAnalyticsService - connection lifecycle on top of the store
// ─────────────────────────────────────────────────────────────────────────────

use crate::db::Db;
use crate::error::NotConnectedReason;
use crate::models::GaCredential;
use crate::services::oauth_state;
use chrono::Utc;
use serde::Serialize;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Result of looking up a usable credential.
#[derive(Debug, Clone)]
pub enum Connection {
    /// Credential with a non-stale access token.
    Ready(GaCredential),
    NotConnected(NotConnectedReason),
}

/// Consent redirect plus the nonce to keep in the caller's session.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub nonce: String,
}

/// Flattened GA4 property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct GaProperty {
    pub property_name: String,
    pub property_id: String,
    pub account_name: String,
}

/// Local view of a user's connection, without contacting Google.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ConnectionStatus {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_refresh_token: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_exists: Option<bool>,
}

/// Flatten account summaries into one record per property.
pub fn flatten_properties(summaries: &[AccountSummary]) -> Vec<GaProperty> {
    summaries
        .iter()
        .flat_map(|account| {
            let account_name = if account.display_name.is_empty() {
                account.account.clone()
            } else {
                account.display_name.clone()
            };

            account
                .property_summaries
                .iter()
                .map(move |property| GaProperty {
                    property_name: property.display_name.clone(),
                    property_id: property.property.clone(),
                    account_name: account_name.clone(),
                })
        })
        .collect()
}

/// Google Analytics connection service.
///
/// Owns the per-user credential lifecycle:
/// - Consent redirect with a session-bound state
/// - Code exchange and credential upsert
/// - Staleness check and refresh before use
/// - Property listing, disconnect and status
#[derive(Clone)]
pub struct GoogleAnalyticsService {
    client: GoogleClient,
    db: Db,
    state_key: Vec<u8>,
}

impl GoogleAnalyticsService {
    pub fn new(client: GoogleClient, db: Db, state_key: Vec<u8>) -> Self {
        Self {
            client,
            db,
            state_key,
        }
    }

    // ─── OAuth Connector ─────────────────────────────────────────────────────

    /// Start the consent flow for `username`.
    pub fn begin_authorization(&self, username: &str) -> Result<AuthorizationRequest, AppError> {
        let issued = oauth_state::issue(username, &self.state_key, Utc::now())
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to issue OAuth state: {}", e)))?;

        tracing::info!(
            username,
            client_id = %self.client.client_id(),
            "Starting Google Analytics OAuth flow"
        );

        Ok(AuthorizationRequest {
            url: self.client.authorization_url(&issued.state),
            nonce: issued.nonce,
        })
    }

    /// Handle the provider callback: verify state, exchange code, upsert credential.
    pub async fn complete_authorization(
        &self,
        username: &str,
        code: &str,
        state: &str,
        session_nonce: Option<&str>,
    ) -> Result<GaCredential, AppError> {
        let now = Utc::now();
        oauth_state::verify(state, &self.state_key, username, session_nonce, now)
            .map_err(|e| AppError::InvalidState(e.to_string()))?;

        tracing::info!(username, "Exchanging authorization code for tokens");
        let tokens = self.client.exchange_code(code).await?;

        let existing = self.db.get_credential(username).await?;
        let (created_at, selected_property_id, selected_property_name) = match existing {
            Some(prev) => (
                prev.created_at,
                prev.selected_property_id,
                prev.selected_property_name,
            ),
            None => (now, None, None),
        };

        let granted_scopes = tokens.granted_scopes();
        let expiry = tokens.expiry_from(now);
        let credential = GaCredential {
            owner: username.to_string(),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token.unwrap_or_default(),
            token_endpoint: self.client.token_url().to_string(),
            client_id: self.client.secrets.client_id.clone(),
            client_secret: self.client.secrets.client_secret.clone(),
            granted_scopes,
            expiry,
            selected_property_id,
            selected_property_name,
            created_at,
            updated_at: now,
        };

        if credential.refresh_token.is_empty() {
            tracing::warn!(username, "Google did not issue a refresh token");
        }

        self.db.set_credential(&credential).await?;

        tracing::info!(
            username,
            scopes = credential.granted_scopes.len(),
            "Google Analytics credential stored"
        );

        Ok(credential)
    }

    // ─── Credential Refresher ────────────────────────────────────────────────

    /// Load the user's credential, refreshing the access token if stale.
    pub async fn valid_credential(&self, username: &str) -> Result<Connection, AppError> {
        let Some(mut credential) = self.db.get_credential(username).await? else {
            return Ok(Connection::NotConnected(NotConnectedReason::NoRecord));
        };

        if !credential.has_tokens() {
            return Ok(Connection::NotConnected(NotConnectedReason::MissingTokens));
        }

        let now = Utc::now();
        if !credential.is_expired(now) {
            return Ok(Connection::Ready(credential));
        }

        tracing::info!(username, "Access token expired, refreshing");

        let refreshed = match self
            .client
            .refresh_access_token(
                &credential.token_endpoint,
                &credential.client_id,
                &credential.client_secret,
                &credential.refresh_token,
            )
            .await
        {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(username, error = %e, "Token refresh failed");
                return Ok(Connection::NotConnected(NotConnectedReason::RefreshFailed));
            }
        };

        credential.expiry = refreshed.expiry_from(now);
        credential.access_token = refreshed.access_token;
        credential.updated_at = now;

        if !self.db.update_credential_tokens(&credential).await? {
            tracing::info!(username, "Credential removed during refresh");
            return Ok(Connection::NotConnected(NotConnectedReason::NoRecord));
        }

        tracing::info!(username, "Access token refreshed");
        Ok(Connection::Ready(credential))
    }

    // ─── Property Lister ─────────────────────────────────────────────────────

    /// List every GA4 property the user's credential can see.
    pub async fn list_properties(&self, username: &str) -> Result<Vec<GaProperty>, AppError> {
        let credential = match self.valid_credential(username).await? {
            Connection::Ready(c) => c,
            Connection::NotConnected(reason) => return Err(AppError::NotConnected(reason)),
        };

        let summaries = self
            .client
            .list_account_summaries(&credential.access_token)
            .await?;

        let properties = flatten_properties(&summaries);
        tracing::debug!(
            username,
            accounts = summaries.len(),
            properties = properties.len(),
            "Listed GA4 properties"
        );
        Ok(properties)
    }

    // ─── Disconnect / Status / Selection ─────────────────────────────────────

    /// Remove the user's credential. Returns `false` if there was none.
    pub async fn disconnect(&self, username: &str) -> Result<bool, AppError> {
        let removed = self.db.delete_credential(username).await?;
        if removed {
            tracing::info!(username, "Google Analytics disconnected");
        }
        Ok(removed)
    }

    /// Report whether a credential exists and carries both tokens.
    pub async fn connection_status(&self, username: &str) -> Result<ConnectionStatus, AppError> {
        let status = match self.db.get_credential(username).await? {
            Some(credential) => ConnectionStatus {
                connected: credential.has_tokens(),
                has_refresh_token: Some(!credential.refresh_token.is_empty()),
                token_exists: Some(true),
            },
            None => ConnectionStatus {
                connected: false,
                has_refresh_token: None,
                token_exists: None,
            },
        };
        Ok(status)
    }

    /// Store the user's chosen property. Returns `false` if not connected.
    pub async fn select_property(
        &self,
        username: &str,
        property_id: &str,
        property_name: Option<&str>,
    ) -> Result<bool, AppError> {
        let Some(mut credential) = self.db.get_credential(username).await? else {
            return Ok(false);
        };

        credential.selected_property_id = Some(property_id.to_string());
        credential.selected_property_name = property_name.map(String::from);
        credential.updated_at = Utc::now();
        self.db.set_credential(&credential).await?;

        tracing::info!(username, property_id, "Selected GA4 property");
        Ok(true)
    }
}
