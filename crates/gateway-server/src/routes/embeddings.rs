//! `POST /v1/embeddings`, a thin adapter-registry dispatch: the adapter
//! itself reads `model`/`input`/`dimensions` out of the raw request body
//! and returns an OpenAI-shaped embeddings list.

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gateway_core::errors::GatewayError;
use serde_json::Value;
use tracing::instrument;

use crate::error::HttpError;
use crate::state::AppState;

#[instrument(skip(state, request))]
pub async fn embeddings(State(state): State<AppState>, Json(request): Json<Value>) -> Result<Response, HttpError> {
    let model_id = request["model"]
        .as_str()
        .ok_or_else(|| GatewayError::InvalidRequest("`model` is required".to_string()))?
        .to_string();

    let adapter = state
        .adapters
        .resolve(&model_id)
        .await
        .ok_or_else(|| GatewayError::ModelNotFound { model: model_id.clone(), available_models: Vec::new() })?;

    let response = adapter.invoke(request).await?;
    Ok(Json(response).into_response())
}
