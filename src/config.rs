// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Transport security for the OAuth flow is an explicit setting here
//! (`OAUTH_ALLOW_INSECURE_TRANSPORT`); nothing else in the process toggles it.

use std::env;
use std::path::PathBuf;

/// Google OAuth authorization endpoint.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
/// Google OAuth token endpoint (also the default refresh endpoint on records).
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
/// Google Analytics Admin API base URL.
pub const ANALYTICS_ADMIN_URL: &str = "https://analyticsadmin.googleapis.com/v1beta";

/// Scopes requested when connecting Google Analytics.
pub const GOOGLE_SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/analytics.readonly",
    "https://www.googleapis.com/auth/userinfo.profile",
];

/// Session cookie name.
pub const SESSION_COOKIE: &str = "insightdash_session";
/// CSRF cookie name (double-submit with the `X-CSRFToken` header).
pub const CSRF_COOKIE: &str = "csrftoken";
/// Header carrying the CSRF token on unsafe requests.
pub const CSRF_HEADER: &str = "x-csrftoken";
/// Cookie holding the OAuth anti-forgery nonce between connect and callback.
pub const OAUTH_NONCE_COOKIE: &str = "insightdash_oauth_nonce";
/// Path of the OAuth callback route (also the nonce cookie path).
pub const OAUTH_CALLBACK_PATH: &str = "/google/callback/";

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,
    /// Frontend origin allowed by CORS
    pub frontend_url: String,
    /// Where the browser lands after login, register and OAuth completion
    pub home_url: String,
    /// GCP project for Firestore; `None` selects the in-memory store
    pub gcp_project_id: Option<String>,

    /// HS256 key for session tokens (raw bytes)
    pub session_signing_key: Vec<u8>,
    /// HMAC key for the OAuth state parameter
    pub oauth_state_key: Vec<u8>,
    /// Mark cookies `Secure`
    pub secure_cookies: bool,

    /// Path to the Google OAuth client secrets JSON file
    pub google_client_secrets_file: PathBuf,
    /// Redirect URI registered with Google
    pub google_redirect_uri: String,
    pub google_auth_url: String,
    pub google_token_url: String,
    pub analytics_admin_url: String,
    /// Permit plain-http OAuth endpoints and redirect URI (local development)
    pub allow_insecure_transport: bool,
    /// Timeout for every outbound HTTP call, in seconds
    pub http_timeout_secs: u64,
    /// Include upstream error chains in 500 responses
    pub expose_error_details: bool,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            port: 8000,
            frontend_url: "http://localhost:3000".to_string(),
            home_url: "/".to_string(),
            gcp_project_id: None,
            session_signing_key: b"test_session_key_32_bytes_min!!!".to_vec(),
            oauth_state_key: b"test_oauth_state_key_32_bytes!!!".to_vec(),
            secure_cookies: false,
            google_client_secrets_file: PathBuf::from("client_secret.json"),
            google_redirect_uri: "http://localhost:8000/google/callback/".to_string(),
            google_auth_url: GOOGLE_AUTH_URL.to_string(),
            google_token_url: GOOGLE_TOKEN_URL.to_string(),
            analytics_admin_url: ANALYTICS_ADMIN_URL.to_string(),
            allow_insecure_transport: true,
            http_timeout_secs: 10,
            expose_error_details: false,
        }
    }
}

impl Config {
    /// Config used by integration tests.
    pub fn test_default() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let session_signing_key = env::var("SESSION_SIGNING_KEY")
            .map(|v| v.trim().to_string())
            .map_err(|_| ConfigError::Missing("SESSION_SIGNING_KEY"))?
            .into_bytes();

        let oauth_state_key = env::var("OAUTH_STATE_KEY")
            .map(|v| v.trim().as_bytes().to_vec())
            .unwrap_or_else(|_| session_signing_key.clone());

        let config = Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .unwrap_or(8000),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            home_url: env::var("HOME_URL").unwrap_or_else(|_| "/".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").ok().filter(|v| !v.is_empty()),

            session_signing_key,
            oauth_state_key,
            secure_cookies: env_flag("SECURE_COOKIES"),

            google_client_secrets_file: env::var("GOOGLE_CLIENT_SECRETS_FILE")
                .unwrap_or_else(|_| "client_secret.json".to_string())
                .into(),
            google_redirect_uri: env::var("GOOGLE_REDIRECT_URI")
                .unwrap_or_else(|_| "http://localhost:8000/google/callback/".to_string()),
            google_auth_url: env::var("GOOGLE_AUTH_URL")
                .unwrap_or_else(|_| GOOGLE_AUTH_URL.to_string()),
            google_token_url: env::var("GOOGLE_TOKEN_URL")
                .unwrap_or_else(|_| GOOGLE_TOKEN_URL.to_string()),
            analytics_admin_url: env::var("ANALYTICS_ADMIN_URL")
                .unwrap_or_else(|_| ANALYTICS_ADMIN_URL.to_string()),
            allow_insecure_transport: env_flag("OAUTH_ALLOW_INSECURE_TRANSPORT"),
            http_timeout_secs: env::var("HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            expose_error_details: env_flag("EXPOSE_ERROR_DETAILS"),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would send OAuth traffic over plain http
    /// without the explicit opt-in.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_signing_key.len() < 32 {
            return Err(ConfigError::Invalid(
                "SESSION_SIGNING_KEY must be at least 32 bytes".to_string(),
            ));
        }

        for (name, url) in [
            ("GOOGLE_REDIRECT_URI", &self.google_redirect_uri),
            ("GOOGLE_AUTH_URL", &self.google_auth_url),
            ("GOOGLE_TOKEN_URL", &self.google_token_url),
            ("ANALYTICS_ADMIN_URL", &self.analytics_admin_url),
        ] {
            if !is_transport_allowed(url, self.allow_insecure_transport) {
                return Err(ConfigError::InsecureTransport(name));
            }
        }

        Ok(())
    }
}

/// Whether `url` may carry OAuth traffic under the given transport policy.
pub fn is_transport_allowed(url: &str, allow_insecure: bool) -> bool {
    match reqwest::Url::parse(url) {
        Ok(parsed) => match parsed.scheme() {
            "https" => true,
            "http" => allow_insecure,
            _ => false,
        },
        Err(_) => false,
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("{0} must use https unless OAUTH_ALLOW_INSECURE_TRANSPORT is set")]
    InsecureTransport(&'static str),
}
