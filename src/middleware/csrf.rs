// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Double-submit CSRF protection.
//!
//! Unsafe requests must echo the `csrftoken` cookie in the `X-CSRFToken`
//! header. Tokens are issued by `GET /get-csrf-token/`.

use crate::config::{CSRF_COOKIE, CSRF_HEADER};
use crate::error::AppError;
use axum::{extract::Request, http::Method, middleware::Next, response::Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use subtle::ConstantTimeEq;

/// CSRF cookie lifetime (one year).
const CSRF_COOKIE_TTL_DAYS: i64 = 365;

/// Reject unsafe requests whose CSRF header does not match the cookie.
pub async fn require_csrf(jar: CookieJar, request: Request, next: Next) -> Result<Response, AppError> {
    if matches!(
        *request.method(),
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    ) {
        return Ok(next.run(request).await);
    }

    let cookie = jar.get(CSRF_COOKIE).map(|c| c.value().to_string());
    let header = request
        .headers()
        .get(CSRF_HEADER)
        .and_then(|h| h.to_str().ok());

    match (cookie.as_deref(), header) {
        (Some(cookie), Some(header))
            if !cookie.is_empty() && bool::from(cookie.as_bytes().ct_eq(header.as_bytes())) =>
        {
            Ok(next.run(request).await)
        }
        (cookie, header) => {
            tracing::warn!(
                method = %request.method(),
                path = %request.uri().path(),
                has_cookie = cookie.is_some(),
                has_header = header.is_some(),
                "CSRF verification failed"
            );
            Err(AppError::CsrfFailed)
        }
    }
}

/// CSRF cookie; readable by the frontend so it can echo it.
pub fn csrf_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((CSRF_COOKIE, token))
        .path("/")
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(time::Duration::days(CSRF_COOKIE_TTL_DAYS))
        .build()
}
