//! Shared fixtures for API integration tests.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use waitline_api::auth::jwt::JwtConfig;
use waitline_api::config::{QueueSettings, ServerConfig};
use waitline_api::router::build_app_router;
use waitline_api::state::AppState;
use waitline_core::idle::IdleConfig;
use waitline_core::types::DbId;

/// Queue seeded into every test state.
pub const QUEUE_ID: DbId = 1;

/// Test configuration with a single seeded queue and a known JWT secret.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 5,
        shutdown_timeout_secs: 5,
        jwt: JwtConfig {
            secret: "test-secret-that-is-long-enough-for-hmac".to_string(),
            access_token_expiry_mins: 60,
        },
        queue: QueueSettings {
            seed_queue_ids: vec![QUEUE_ID],
            code_length: 4,
            capacity: None,
            call_timeout: None,
            grace_period: Duration::from_secs(300),
            retention: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
            avg_service_time: Duration::from_secs(600),
        },
        idle: IdleConfig::default(),
    }
}

/// Test configuration with a zero-length grace period (instant expiry).
pub fn test_config_no_grace() -> ServerConfig {
    let mut config = test_config();
    config.queue.grace_period = Duration::ZERO;
    config
}

/// Fully wired application state for tests.
pub fn test_state() -> AppState {
    AppState::from_config(test_config())
}

/// Router over a state, with the production middleware stack.
pub fn app(state: &AppState) -> Router {
    let config = Arc::clone(&state.config);
    build_app_router(state.clone(), &config)
}

/// Issue a merchant Bearer token valid for the test state.
pub fn merchant_token(state: &AppState) -> String {
    waitline_api::auth::jwt::generate_access_token(7, "owner", &state.config.jwt)
        .expect("token generation should succeed")
}

/// Drive one request through the router and decode the JSON response.
pub async fn request_json(
    app: &Router,
    method: Method,
    uri: &str,
    bearer: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .expect("request should build"),
        None => builder.body(Body::empty()).expect("request should build"),
    };

    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("request should not fail at the transport level");

    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("response body should be JSON")
    };

    (status, json)
}
