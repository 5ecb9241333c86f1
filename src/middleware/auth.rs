// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session authentication middleware and cookie helpers.
//!
//! A session is an HS256 JWT whose subject is the username, carried in the
//! `insightdash_session` cookie or an `Authorization: Bearer` header.

use crate::config::{OAUTH_CALLBACK_PATH, OAUTH_NONCE_COOKIE, SESSION_COOKIE};
use crate::error::AppError;
use crate::models::user::is_valid_username;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Session lifetime (two weeks).
pub const SESSION_TTL_SECS: usize = 14 * 24 * 60 * 60;

/// Lifetime of the OAuth nonce cookie.
const OAUTH_NONCE_TTL_MINUTES: i64 = 10;

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (username)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
}

/// Authenticated user extracted from the session.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub username: String,
}

/// Resolve the session user from the cookie (preferred) or bearer header.
pub fn session_user(jar: &CookieJar, headers: &HeaderMap, signing_key: &[u8]) -> Option<AuthUser> {
    let token = match jar.get(SESSION_COOKIE) {
        Some(cookie) => cookie.value().to_string(),
        None => headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(|t| t.to_string())?,
    };

    let key = DecodingKey::from_secret(signing_key);
    let validation = Validation::new(Algorithm::HS256);
    let token_data = decode::<Claims>(&token, &key, &validation).ok()?;

    if !is_valid_username(&token_data.claims.sub) {
        return None;
    }

    Some(AuthUser {
        username: token_data.claims.sub,
    })
}

/// Middleware that requires a valid session.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_user = session_user(&jar, request.headers(), &state.config.session_signing_key)
        .ok_or(AppError::Unauthorized)?;

    request.extensions_mut().insert(auth_user);

    Ok(next.run(request).await)
}

/// Create a session token for a user.
pub fn create_session_token(username: &str, signing_key: &[u8]) -> anyhow::Result<String> {
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as usize;

    let claims = Claims {
        sub: username.to_string(),
        iat: now,
        exp: now + SESSION_TTL_SECS,
    };

    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )?)
}

/// Session cookie carrying `token`.
pub fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(time::Duration::seconds(SESSION_TTL_SECS as i64))
        .build()
}

/// Removal cookie matching [`session_cookie`] attributes.
pub fn session_cookie_removal(secure: bool) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

/// OAuth nonce cookie, only sent back to the callback route.
pub fn oauth_nonce_cookie(nonce: String, secure: bool) -> Cookie<'static> {
    Cookie::build((OAUTH_NONCE_COOKIE, nonce))
        .path(OAUTH_CALLBACK_PATH)
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(time::Duration::minutes(OAUTH_NONCE_TTL_MINUTES))
        .build()
}

/// Removal cookie matching [`oauth_nonce_cookie`] attributes.
pub fn oauth_nonce_cookie_removal(secure: bool) -> Cookie<'static> {
    Cookie::build(OAUTH_NONCE_COOKIE)
        .path(OAUTH_CALLBACK_PATH)
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}
