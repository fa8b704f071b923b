//! REST API Endpoints
//!
//! Rebuild trigger plus health, status, and per-round result queries.

use crate::auth::SIGNATURE_HEADER;
use crate::rebuild::RebuildError;
use crate::state::{AppState, LastError, Trigger};
use airdrop_claims::RebuildResult;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::collections::BTreeMap;
use tower_http::trace::TraceLayer;

/// Run the API server
pub async fn run_server(listen: String, state: AppState) -> anyhow::Result<()> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&listen).await?;
    tracing::info!(address = %listen, "API server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/rebuild", get(rebuild).post(rebuild))
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/rounds/{round}", get(get_round))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Body returned for failed rebuilds and rejected triggers
#[derive(Debug, Serialize)]
struct ErrorResponse {
    ok: bool,
    kind: &'static str,
    error: String,
}

impl ErrorResponse {
    fn new(kind: &'static str, error: impl Into<String>) -> Self {
        Self {
            ok: false,
            kind,
            error: error.into(),
        }
    }
}

/// Status for a hard failure: upstream problems are 502, local ones 500.
fn failure_status(error: &RebuildError) -> StatusCode {
    match error {
        RebuildError::Rpc(_) | RebuildError::Scan(_) => StatusCode::BAD_GATEWAY,
        RebuildError::Config(_) | RebuildError::TargetNotFound { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

fn signature(headers: &HeaderMap) -> Option<&str> {
    headers.get(SIGNATURE_HEADER)?.to_str().ok()
}

/// Trigger one rebuild; the raw body is only read for signature checks.
async fn rebuild(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if !state.authorized(bearer_token(&headers), signature(&headers), &body) {
        tracing::warn!("Rejected unauthorized rebuild trigger");
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new(
                "unauthorized",
                "missing or invalid bearer token or signature",
            )),
        )
            .into_response();
    }

    match state.trigger().await {
        Trigger::Busy => (
            StatusCode::CONFLICT,
            Json(ErrorResponse::new("busy", "a rebuild is already running")),
        )
            .into_response(),
        Trigger::Finished(Ok(result)) => (StatusCode::OK, Json(result)).into_response(),
        Trigger::Finished(Err(e)) => (
            failure_status(&e),
            Json(ErrorResponse::new(e.kind(), e.to_string())),
        )
            .into_response(),
    }
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    rebuilding: bool,
}

/// Health check endpoint
async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let healthy = state.is_healthy();
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "degraded" },
        rebuilding: state.is_running(),
    };

    (status_code, Json(response))
}

/// Status response
#[derive(Serialize)]
struct StatusResponse {
    uptime_secs: u64,
    rebuilding: bool,
    runs: BTreeMap<String, u64>,
    failures: u64,
    last_result: Option<RebuildResult>,
    last_error: Option<LastError>,
}

/// Status endpoint
async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        uptime_secs: state.uptime_secs(),
        rebuilding: state.is_running(),
        runs: state.runs_by_reason(),
        failures: state.failures(),
        last_result: state.last_result(),
        last_error: state.last_error(),
    })
}

/// Last result recorded for a round
async fn get_round(
    State(state): State<AppState>,
    Path(round): Path<u64>,
) -> Result<Json<RebuildResult>, StatusCode> {
    state
        .result_for_round(round)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}
