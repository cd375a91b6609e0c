//! `POST /v1/images/generations`, dispatched through the adapter registry
//! the same way as embeddings — the adapter owns prompt/size/format
//! parsing and any S3 upload for `response_format=url`.

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gateway_core::errors::GatewayError;
use serde_json::Value;
use tracing::instrument;

use crate::error::HttpError;
use crate::state::AppState;

#[instrument(skip(state, request))]
pub async fn generate_image(State(state): State<AppState>, Json(request): Json<Value>) -> Result<Response, HttpError> {
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
