// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Account routes: registration, login, logout, session and CSRF probes.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::Arc;
use validator::{Validate, ValidationError};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::config::{Config, CSRF_COOKIE};
use crate::error::{AppError, Result};
use crate::middleware::auth::{
    create_session_token, oauth_nonce_cookie_removal, session_cookie, session_cookie_removal,
    session_user,
};
use crate::middleware::csrf::csrf_cookie;
use crate::models::user::is_valid_username;
use crate::models::User;
use crate::services::oauth_state::random_hex;
use crate::services::password::{
    hash_password, password_problems, verify_password, verify_without_account,
};
use crate::AppState;

/// Bytes of randomness in a CSRF token.
const CSRF_TOKEN_BYTES: usize = 32;

/// Where logout sends callers that have no session.
const LOGOUT_LOGIN_REDIRECT: &str = "/login/?next=/logout/";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register/", post(register))
        .route("/login/", post(login))
        .route("/logout/", post(logout))
        .route("/check-auth/", get(check_auth))
        .route("/get-csrf-token/", get(get_csrf_token))
}

#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = "validate_password_strength"))]
pub struct RegisterForm {
    #[validate(custom(function = "validate_username"))]
    pub username: String,
    #[validate(length(min = 1))]
    pub password1: String,
    #[validate(must_match(other = "password1", message = "The two password fields didn't match."))]
    pub password2: String,
}

fn validate_username(username: &str) -> std::result::Result<(), ValidationError> {
    if is_valid_username(username) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_username").with_message(Cow::Borrowed(
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        )))
    }
}

fn validate_password_strength(form: &RegisterForm) -> std::result::Result<(), ValidationError> {
    let problems = password_problems(&form.password1, &form.username);
    if problems.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::new("weak_password").with_message(Cow::Owned(problems.join(" "))))
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AuthStatusResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CsrfTokenResponse {
    #[serde(rename = "csrfToken")]
    pub csrf_token: String,
}

/// Create an account and log it in.
async fn register(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
    Form(form): Form<RegisterForm>,
) -> Result<(CookieJar, Redirect)> {
    let config = &state.config;
    if session_user(&jar, &headers, &config.session_signing_key).is_some() {
        return Ok((jar, Redirect::to(&config.home_url)));
    }

    form.validate()?;

    let password_hash = hash_password(&form.password1)?;
    let user = User::new(&form.username, password_hash);

    if !state.db.create_user(&user).await? {
        return Err(AppError::BadRequest(
            "A user with that username already exists.".to_string(),
        ));
    }

    tracing::info!(username = %user.username, "User registered");

    Ok((start_session(config, jar, &user.username)?, Redirect::to(&config.home_url)))
}

/// Verify credentials and start a session.
async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<(CookieJar, Redirect)> {
    let config = &state.config;
    if session_user(&jar, &headers, &config.session_signing_key).is_some() {
        return Ok((jar, Redirect::to(&config.home_url)));
    }

    let account = if is_valid_username(&form.username) {
        state.db.get_user(&form.username).await?
    } else {
        None
    };

    let verified = match account {
        Some(user) => verify_password(&form.password, &user.password_hash).then_some(user),
        None => {
            verify_without_account(&form.password);
            None
        }
    };

    let mut user = match verified {
        Some(user) => user,
        None => {
            tracing::info!(username = %form.username, "Login rejected");
            return Err(AppError::BadRequest(
                "Please enter a correct username and password. Note that both fields may be case-sensitive."
                    .to_string(),
            ));
        }
    };

    user.last_login = Some(chrono::Utc::now());
    if let Err(e) = state.db.update_user(&user).await {
        tracing::warn!(username = %user.username, error = %e, "Failed to record last login");
    }

    tracing::info!(username = %user.username, "User logged in");

    Ok((start_session(config, jar, &user.username)?, Redirect::to(&config.home_url)))
}

/// Set the session cookie and rotate the CSRF token.
fn start_session(config: &Config, jar: CookieJar, username: &str) -> Result<CookieJar> {
    let token = create_session_token(username, &config.session_signing_key)?;
    Ok(jar
        .add(session_cookie(token, config.secure_cookies))
        .add(csrf_cookie(new_csrf_token()?, config.secure_cookies)))
}

fn new_csrf_token() -> Result<String> {
    random_hex(CSRF_TOKEN_BYTES)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("CSRF token generation failed: {}", e)))
}

/// End the session. Callers without one are sent to the login page.
async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap, jar: CookieJar) -> Response {
    let config = &state.config;
    let Some(user) = session_user(&jar, &headers, &config.session_signing_key) else {
        return Redirect::to(LOGOUT_LOGIN_REDIRECT).into_response();
    };

    tracing::info!(username = %user.username, "User logged out");

    let jar = jar
        .remove(session_cookie_removal(config.secure_cookies))
        .remove(oauth_nonce_cookie_removal(config.secure_cookies));
    (jar, Redirect::to(&config.home_url)).into_response()
}

/// Report whether the caller has a session (403 if not).
async fn check_auth(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> (StatusCode, Json<AuthStatusResponse>) {
    match session_user(&jar, &headers, &state.config.session_signing_key) {
        Some(user) => (
            StatusCode::OK,
            Json(AuthStatusResponse {
                authenticated: true,
                username: Some(user.username),
            }),
        ),
        None => (
            StatusCode::FORBIDDEN,
            Json(AuthStatusResponse {
                authenticated: false,
                username: None,
            }),
        ),
    }
}

/// Issue (or re-issue) the CSRF token and set the matching cookie.
async fn get_csrf_token(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<CsrfTokenResponse>)> {
    let token = match jar.get(CSRF_COOKIE).map(|c| c.value().to_string()) {
        Some(existing) if !existing.is_empty() => existing,
        _ => new_csrf_token()?,
    };

    Ok((
        jar.add(csrf_cookie(token.clone(), state.config.secure_cookies)),
        Json(CsrfTokenResponse { csrf_token: token }),
    ))
}
