// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google Analytics connection routes.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Redirect,
    routing::{get, post},
    Extension, Form, Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::config::{Config, OAUTH_NONCE_COOKIE};
use crate::error::{AppError, Result};
use crate::middleware::auth::{oauth_nonce_cookie, oauth_nonce_cookie_removal, AuthUser};
use crate::services::google::{ConnectionStatus, GaProperty};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/connect-google/", get(connect_google))
        .route("/google/callback/", get(google_callback))
        .route("/disconnect-google/", post(disconnect_google))
        .route("/check-ga-connection/", get(check_ga_connection))
        .route("/ga4-properties/", get(list_ga4_properties))
        .route("/select-ga4-property/", post(select_ga4_property))
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SelectPropertyForm {
    #[validate(length(min = 1, max = 255))]
    pub property_id: String,
    #[serde(default)]
    #[validate(length(max = 255))]
    pub property_name: Option<String>,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct DisconnectResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct PropertiesResponse {
    pub properties: Vec<GaProperty>,
    pub connected: bool,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SelectPropertyResponse {
    pub success: bool,
    pub property_id: String,
}

/// Redirect to the Google consent screen.
async fn connect_google(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect)> {
    let request = state.google.begin_authorization(&user.username)?;

    Ok((
        jar.add(oauth_nonce_cookie(request.nonce, state.config.secure_cookies)),
        Redirect::temporary(&request.url),
    ))
}

/// OAuth callback: verify state, exchange the code and store the credential.
async fn google_callback(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<(CookieJar, Redirect)> {
    let config = &state.config;
    let session_nonce = jar.get(OAUTH_NONCE_COOKIE).map(|c| c.value().to_string());
    let jar = jar.remove(oauth_nonce_cookie_removal(config.secure_cookies));

    if let Some(error) = params.error {
        tracing::warn!(username = %user.username, error = %error, "OAuth error from Google");
        let redirect = format!("{}?ga_error={}", config.home_url, urlencoding::encode(&error));
        return Ok((jar, Redirect::to(&redirect)));
    }

    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing authorization code".to_string()))?;

    let completed = state
        .google
        .complete_authorization(
            &user.username,
            &code,
            params.state.as_deref().unwrap_or_default(),
            session_nonce.as_deref(),
        )
        .await;

    match completed {
        Ok(_) => Ok((jar, Redirect::to(&config.home_url))),
        Err(AppError::GoogleApi(message)) => {
            tracing::error!(
                username = %user.username,
                error = %message,
                "Authorization code exchange failed"
            );
            Err(upstream_error(
                config,
                "Failed to exchange authorization code with Google",
                message,
            ))
        }
        Err(e) => Err(e),
    }
}

/// Wrap a Google failure as a 500, attaching the detail only when configured.
fn upstream_error(config: &Config, message: &str, detail: String) -> AppError {
    AppError::Upstream {
        message: message.to_string(),
        traceback: config
            .expose_error_details
            .then(|| format!("{:?}", AppError::GoogleApi(detail))),
    }
}

/// Remove the stored credential.
async fn disconnect_google(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<(StatusCode, Json<DisconnectResponse>)> {
    if state.google.disconnect(&user.username).await? {
        Ok((
            StatusCode::OK,
            Json(DisconnectResponse {
                success: true,
                message: "Google Analytics disconnected".to_string(),
            }),
        ))
    } else {
        Ok((
            StatusCode::NOT_FOUND,
            Json(DisconnectResponse {
                success: false,
                message: "No Google Analytics connection found".to_string(),
            }),
        ))
    }
}

/// Local connection status; never contacts Google.
async fn check_ga_connection(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ConnectionStatus>> {
    Ok(Json(state.google.connection_status(&user.username).await?))
}

/// List every GA4 property visible to the user's credential.
async fn list_ga4_properties(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<PropertiesResponse>> {
    match state.google.list_properties(&user.username).await {
        Ok(properties) => Ok(Json(PropertiesResponse {
            properties,
            connected: true,
        })),
        Err(AppError::GoogleApi(message)) => {
            tracing::error!(
                username = %user.username,
                error = %message,
                "Failed to list GA4 properties"
            );
            Err(upstream_error(
                &state.config,
                "Failed to fetch GA4 properties from Google",
                message,
            ))
        }
        Err(e) => Err(e),
    }
}

/// Remember which property the user wants to work with.
async fn select_ga4_property(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Form(form): Form<SelectPropertyForm>,
) -> Result<Json<SelectPropertyResponse>> {
    form.validate()?;

    let selected = state
        .google
        .select_property(
            &user.username,
            &form.property_id,
            form.property_name.as_deref().filter(|n| !n.is_empty()),
        )
        .await?;

    if !selected {
        return Err(AppError::NotFound(
            "No Google Analytics connection found".to_string(),
        ));
    }

    Ok(Json(SelectPropertyResponse {
        success: true,
        property_id: form.property_id,
    }))
}
