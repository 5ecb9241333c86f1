// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::{DateTime, Utc};
use insightdash::config::Config;
use insightdash::db::{Db, MemoryStore};
use insightdash::middleware::auth::create_session_token;
use insightdash::models::GaCredential;
use insightdash::routes::create_router;
use insightdash::services::{ClientSecrets, GoogleAnalyticsService, GoogleClient};
use insightdash::AppState;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

/// CSRF token used by test requests (cookie and header).
#[allow(dead_code)]
pub const CSRF_TOKEN: &str = "test-csrf-token";

pub const TEST_CLIENT_ID: &str = "test-client-id";
pub const TEST_CLIENT_SECRET: &str = "test-client-secret";

/// Call counters for the mock Google endpoints.
#[derive(Clone, Default)]
pub struct MockCalls {
    pub exchange: Arc<AtomicUsize>,
    pub refresh: Arc<AtomicUsize>,
    pub account_summaries: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl MockCalls {
    pub fn exchange_count(&self) -> usize {
        self.exchange.load(Ordering::SeqCst)
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh.load(Ordering::SeqCst)
    }

    pub fn account_summaries_count(&self) -> usize {
        self.account_summaries.load(Ordering::SeqCst)
    }
}

/// Local stand-in for the Google token endpoint and Analytics Admin API.
///
/// Token endpoint:
/// - code `bad-code` is rejected, any other code yields `access-<code>` / `refresh-<code>`
/// - refresh token `revoked-refresh` is rejected, any other yields `refreshed-access`
///
/// `accountSummaries` returns two pages and rejects the bearer tokens
/// `expired-access` (401) and `broken-access` (500).
pub struct MockGoogle {
    pub base_url: String,
    pub calls: MockCalls,
}

impl MockGoogle {
    pub async fn start() -> Self {
        let calls = MockCalls::default();
        let app = Router::new()
            .route("/token", post(mock_token))
            .route("/v1beta/accountSummaries", get(mock_account_summaries))
            .with_state(calls.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            calls,
        }
    }

    pub fn token_url(&self) -> String {
        format!("{}/token", self.base_url)
    }
}

async fn mock_token(
    State(calls): State<MockCalls>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let field = |name: &str| form.get(name).cloned().unwrap_or_default();

    if field("client_id") != TEST_CLIENT_ID || field("client_secret") != TEST_CLIENT_SECRET {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid_client"}))).into_response();
    }

    match field("grant_type").as_str() {
        "authorization_code" => {
            calls.exchange.fetch_add(1, Ordering::SeqCst);
            let code = field("code");
            if code == "bad-code" {
                return (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid_grant"})))
                    .into_response();
            }
            Json(json!({
                "access_token": format!("access-{}", code),
                "refresh_token": format!("refresh-{}", code),
                "expires_in": 3599,
                "token_type": "Bearer",
                "scope": "https://www.googleapis.com/auth/analytics.readonly https://www.googleapis.com/auth/userinfo.profile"
            }))
            .into_response()
        }
        "refresh_token" => {
            calls.refresh.fetch_add(1, Ordering::SeqCst);
            if field("refresh_token") == "revoked-refresh" {
                return (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid_grant"})))
                    .into_response();
            }
            Json(json!({
                "access_token": "refreshed-access",
                "expires_in": 3599,
                "token_type": "Bearer"
            }))
            .into_response()
        }
        _ => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "unsupported_grant_type"})),
        )
            .into_response(),
    }
}

async fn mock_account_summaries(
    State(calls): State<MockCalls>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    calls.account_summaries.fetch_add(1, Ordering::SeqCst);

    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .unwrap_or_default();

    match bearer {
        "" | "expired-access" => {
            return (StatusCode::UNAUTHORIZED, Json(json!({"error": {"code": 401}})))
                .into_response()
        }
        "broken-access" => {
            return (StatusCode::INTERNAL_SERVER_ERROR, "backend exploded").into_response()
        }
        _ => {}
    }

    if query.get("pageSize").map(String::as_str) != Some("200") {
        return (StatusCode::BAD_REQUEST, "pageSize must be 200").into_response();
    }

    match query.get("pageToken").map(String::as_str) {
        None => Json(json!({
            "accountSummaries": [{
                "name": "accountSummaries/1",
                "account": "accounts/1",
                "displayName": "Marketing",
                "propertySummaries": [
                    {"property": "properties/11", "displayName": "Web"},
                    {"property": "properties/12", "displayName": "App"}
                ]
            }],
            "nextPageToken": "page-2"
        }))
        .into_response(),
        Some("page-2") => Json(json!({
            "accountSummaries": [{
                "account": "accounts/2",
                "displayName": "",
                "propertySummaries": [
                    {"property": "properties/21", "displayName": "Blog"}
                ]
            }]
        }))
        .into_response(),
        Some(_) => (StatusCode::BAD_REQUEST, "unknown page token").into_response(),
    }
}

/// Router plus handles to inspect state.
#[allow(dead_code)]
pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub store: MemoryStore,
    pub google: MockGoogle,
}

#[allow(dead_code)]
impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Session cookie header fragment for `username`.
    pub fn session_cookie(&self, username: &str) -> String {
        let token =
            create_session_token(username, &self.state.config.session_signing_key).unwrap();
        format!("insightdash_session={}", token)
    }
}

/// Create a test app backed by memory and a mock Google.
#[allow(dead_code)]
pub async fn create_test_app() -> TestApp {
    create_test_app_with(|_| {}).await
}

/// Create a test app, adjusting the config first.
pub async fn create_test_app_with(configure: impl FnOnce(&mut Config)) -> TestApp {
    let google = MockGoogle::start().await;

    let mut config = Config::test_default();
    config.google_auth_url = format!("{}/auth", google.base_url);
    config.google_token_url = google.token_url();
    config.analytics_admin_url = format!("{}/v1beta", google.base_url);
    configure(&mut config);

    let store = MemoryStore::new();
    let db = Db::from_memory(store.clone());

    let client = GoogleClient::new(
        &config,
        ClientSecrets::new(TEST_CLIENT_ID, TEST_CLIENT_SECRET),
    )
    .unwrap();
    let service = GoogleAnalyticsService::new(client, db.clone(), config.oauth_state_key.clone());

    let state = Arc::new(AppState {
        config,
        db,
        google: service,
    });

    TestApp {
        router: create_router(state.clone()),
        state,
        store,
        google,
    }
}

/// GET with the given `Cookie` header.
#[allow(dead_code)]
pub fn get_request(uri: &str, cookies: &str) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if !cookies.is_empty() {
        builder = builder.header(header::COOKIE, cookies);
    }
    builder.body(Body::empty()).unwrap()
}

/// Form POST carrying a matching CSRF cookie and header.
#[allow(dead_code)]
pub fn post_form(uri: &str, cookies: &str, body: &str) -> Request<Body> {
    let cookies = if cookies.is_empty() {
        format!("csrftoken={}", CSRF_TOKEN)
    } else {
        format!("{}; csrftoken={}", cookies, CSRF_TOKEN)
    };

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::COOKIE, cookies)
        .header("X-CSRFToken", CSRF_TOKEN)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[allow(dead_code)]
pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[allow(dead_code)]
pub fn set_cookie_headers(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect()
}

#[allow(dead_code)]
pub fn find_cookie(headers: &[String], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|value| value.starts_with(&format!("{name}=")))
        .cloned()
}

/// `name=value` part of a Set-Cookie header.
#[allow(dead_code)]
pub fn cookie_pair(set_cookie: &str) -> String {
    set_cookie.split(';').next().unwrap_or_default().to_string()
}

#[allow(dead_code)]
pub fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .expect("missing Location header")
        .to_str()
        .unwrap()
        .to_string()
}

/// Store a credential whose refresh endpoint is the mock.
#[allow(dead_code)]
pub fn seed_credential(
    app: &TestApp,
    username: &str,
    access_token: &str,
    refresh_token: &str,
    expiry: Option<DateTime<Utc>>,
) -> GaCredential {
    let now = Utc::now();
    let credential = GaCredential {
        owner: username.to_string(),
        access_token: access_token.to_string(),
        refresh_token: refresh_token.to_string(),
        token_endpoint: app.google.token_url(),
        client_id: TEST_CLIENT_ID.to_string(),
        client_secret: TEST_CLIENT_SECRET.to_string(),
        granted_scopes: vec!["https://www.googleapis.com/auth/analytics.readonly".to_string()],
        expiry,
        selected_property_id: None,
        selected_property_name: None,
        created_at: now - chrono::Duration::days(1),
        updated_at: now - chrono::Duration::days(1),
    };
    app.store.set_credential(&credential);
    credential
}

/// Start the consent flow; returns the `state` parameter and the nonce cookie pair.
#[allow(dead_code)]
pub async fn begin_connect(app: &TestApp, username: &str) -> (String, String) {
    let response = app
        .send(get_request("/connect-google/", &app.session_cookie(username)))
        .await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

    let url = reqwest::Url::parse(&location(&response)).unwrap();
    let state = url
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .expect("state parameter in consent URL");

    let nonce_cookie = find_cookie(&set_cookie_headers(&response), "insightdash_oauth_nonce")
        .expect("nonce cookie set");

    (state, cookie_pair(&nonce_cookie))
}

/// Run a complete connect flow with `code`; returns the callback response.
#[allow(dead_code)]
pub async fn complete_connect(app: &TestApp, username: &str, code: &str) -> Response {
    let (state, nonce) = begin_connect(app, username).await;
    let uri = format!(
        "/google/callback/?code={}&state={}",
        urlencoding::encode(code),
        urlencoding::encode(&state)
    );
    let cookies = format!("{}; {}", app.session_cookie(username), nonce);
    app.send(get_request(&uri, &cookies)).await
}
