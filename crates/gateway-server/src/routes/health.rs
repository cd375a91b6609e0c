//! `/healthz` (liveness) and `/ready` (readiness) endpoints, grounded in
//! the teacher's `gateway/mod.rs` health/ready handler pair — liveness
//! never touches application state, readiness reports on the pieces that
//! must be warm before traffic is safe to serve.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::instrument;

use crate::state::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    components: ComponentStatus,
}

#[derive(Serialize)]
struct ComponentStatus {
    credentials_initialized: bool,
    catalog_hydrated: bool,
    uptime_seconds: u64,
}

#[instrument]
pub async fn health_handler() -> Response {
    (StatusCode::OK, Json(HealthResponse { status: "ok" })).into_response()
}

#[instrument(skip(state))]
pub async fn ready_handler(State(state): State<AppState>) -> Response {
    let catalog_hydrated = !state.catalog.list_for_response().await.is_empty();
    let components = ComponentStatus {
        credentials_initialized: true,
        catalog_hydrated,
        uptime_seconds: state.started_at.elapsed().as_secs(),
    };

    let status = if catalog_hydrated { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(ReadyResponse { status: if catalog_hydrated { "ready" } else { "not_ready" }, components })).into_response()
}
