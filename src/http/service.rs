//! Rate limit decision service.
//!
//! Proxies and applications call `POST /v1/check` once per inbound action
//! and act on the status code: 200 lets the action through, 429 refuses it.
//! The rate limit headers are meant to be copied onto the client response.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::shaper::ResponseShaper;
use crate::error::GatekeeperError;
use crate::ratelimit::{Policy, RateLimiter, VerdictBody, DEFAULT_POLICY};

/// Shared application state.
pub struct AppState {
    pub limiter: Arc<RateLimiter>,
    pub shaper: ResponseShaper,
}

impl AppState {
    pub fn new(limiter: Arc<RateLimiter>, shaper: ResponseShaper) -> Self {
        Self { limiter, shaper }
    }
}

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// An action to count, or an entry to address.
#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub identifier: String,
    #[serde(default = "default_policy_name")]
    pub policy: String,
}

fn default_policy_name() -> String {
    DEFAULT_POLICY.to_string()
}

/// API-facing wrapper that renders [`GatekeeperError`] as JSON.
#[derive(Debug)]
pub struct ApiError(GatekeeperError);

impl From<GatekeeperError> for ApiError {
    fn from(err: GatekeeperError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            GatekeeperError::InvalidPolicy { .. } => (StatusCode::BAD_REQUEST, "INVALID_POLICY"),
            GatekeeperError::MissingDefaultPolicy(_) | GatekeeperError::Config(_) => {
                (StatusCode::BAD_REQUEST, "CONFIGURATION")
            }
            GatekeeperError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        };
        error_response(status, code, self.0.to_string())
    }
}

fn error_response(status: StatusCode, code: &str, error: String) -> Response {
    (
        status,
        Json(ErrorResponse {
            error,
            code: code.to_string(),
        }),
    )
        .into_response()
}

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/check", post(check))
        .route("/v1/admin/reset", post(reset))
        .route("/v1/admin/policies", get(list_policies).put(register_policy))
        .route("/v1/admin/entries", get(inspect_entry))
        .route("/v1/admin/stats", get(stats))
        .with_state(state)
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "gatekeeper",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Count one action and report whether it may proceed.
pub async fn check(State(state): State<Arc<AppState>>, Json(req): Json<ActionRequest>) -> Response {
    if req.identifier.trim().is_empty() {
        warn!(policy = %req.policy, "Received check with empty identifier");
        return error_response(
            StatusCode::BAD_REQUEST,
            "INVALID_REQUEST",
            "identifier is required".to_string(),
        );
    }

    let now = state.limiter.clock().now();
    let verdict = state.limiter.check(&req.identifier, &req.policy, now);
    let policy = state.limiter.resolve_policy(&req.policy);
    let shaped = state.shaper.shape(&verdict, &policy, now);

    debug!(
        identifier = %req.identifier,
        policy = %req.policy,
        allowed = verdict.is_allowed(),
        remaining = verdict.remaining(),
        "Rate limit decision made"
    );

    let status = shaped.status.unwrap_or(StatusCode::OK);
    (status, shaped.headers, Json(VerdictBody::new(&verdict, &policy.name))).into_response()
}

/// Drop an entry, lifting any block on it. Always succeeds.
pub async fn reset(State(state): State<Arc<AppState>>, Json(req): Json<ActionRequest>) -> StatusCode {
    let removed = state.limiter.reset(&req.identifier, &req.policy);
    info!(identifier = %req.identifier, policy = %req.policy, removed, "Administrative reset");
    StatusCode::NO_CONTENT
}

pub async fn list_policies(State(state): State<Arc<AppState>>) -> Json<Vec<Policy>> {
    Json(state.limiter.policies().policies())
}

/// Add or overwrite a policy.
pub async fn register_policy(
    State(state): State<Arc<AppState>>,
    Json(policy): Json<Policy>,
) -> Result<StatusCode, ApiError> {
    let name = policy.name.clone();
    state.limiter.register_policy(policy)?;
    info!(policy = %name, "Policy registered");
    Ok(StatusCode::NO_CONTENT)
}

/// Look at an entry without counting an action.
pub async fn inspect_entry(State(state): State<Arc<AppState>>, Query(req): Query<ActionRequest>) -> Response {
    let now = state.limiter.clock().now();
    match state.limiter.inspect(&req.identifier, &req.policy, now) {
        Some(snapshot) => Json(snapshot).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("no entry for '{}' under policy '{}'", req.identifier, req.policy),
        ),
    }
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<crate::ratelimit::LimiterStats> {
    Json(state.limiter.stats())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    use crate::ratelimit::{ManualClock, PolicyTable, Timestamp};

    fn app() -> Router {
        let policies = PolicyTable::new([Policy::new(DEFAULT_POLICY, Duration::from_secs(60), 1)]).unwrap();
        let limiter = RateLimiter::new(policies).with_clock(Arc::new(ManualClock::new(Timestamp::EPOCH)));
        router(Arc::new(AppState::new(Arc::new(limiter), ResponseShaper::default())))
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_empty_identifier_rejected() {
        let response = app()
            .oneshot(post_json("/v1/check", r#"{"identifier": "  "}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(error.code, "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn test_check_defaults_policy_name() {
        let response = app()
            .oneshot(post_json("/v1/check", r#"{"identifier": "1.2.3.4"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["policy"], "default");
        assert_eq!(json["remaining"], 0);
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
