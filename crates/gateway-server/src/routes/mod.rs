//! Router assembly, grounded in the teacher's `gateway/mod.rs`
//! `create_router_with_state`: one `Router` wiring every route to
//! [`AppState`], a bearer-token middleware layer, and HTTP tracing.

pub mod audio;
pub mod chat;
pub mod embeddings;
pub mod health;
pub mod images;
pub mod models;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::require_bearer_token;
use crate::request_context::attach_request_context;
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let authenticated = Router::new()
        .route("/v1/chat/completions", post(chat::chat_completions))
        .route("/v1/embeddings", post(embeddings::embeddings))
        .route("/v1/images/generations", post(images::generate_image))
        .route("/v1/audio/speech", post(audio::speech))
        .route("/v1/audio/transcriptions", post(audio::transcriptions))
        .route("/v1/audio/translations", post(audio::translations))
        .route("/v1/models", get(models::list_models))
        .route("/v1/models/{model_id}", get(models::get_model))
        .route("/available_models", get(models::available_models))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer_token));

    Router::new()
        .route("/healthz", get(health::health_handler))
        .route("/ready", get(health::ready_handler))
        .merge(authenticated)
        .layer(middleware::from_fn_with_state(state.clone(), attach_request_context))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
