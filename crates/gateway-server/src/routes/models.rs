//! `GET /v1/models`, `GET /v1/models/{id}`, and the richer
//! `GET /available_models` (a supplemented feature over the bare OpenAI
//! model-list shape, carrying per-model modality and region metadata).

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use gateway_core::catalog::ModelDescriptor;
use serde::Serialize;
use tracing::instrument;

use crate::error::HttpError;
use crate::state::AppState;

#[derive(Serialize)]
struct OpenAiModel {
    id: String,
    object: &'static str,
    created: i64,
    owned_by: String,
}

#[derive(Serialize)]
struct OpenAiModelList {
    object: &'static str,
    data: Vec<OpenAiModel>,
}

fn to_openai_model(descriptor: &ModelDescriptor) -> OpenAiModel {
    OpenAiModel {
        id: descriptor.id.clone(),
        object: "model",
        created: 0,
        owned_by: descriptor.provider.clone(),
    }
}

#[instrument(skip(state))]
pub async fn list_models(State(state): State<AppState>) -> Response {
    let descriptors = state.catalog.list_for_response().await;
    let data = descriptors.iter().map(to_openai_model).collect();
    Json(OpenAiModelList { object: "list", data }).into_response()
}

#[instrument(skip(state))]
pub async fn get_model(State(state): State<AppState>, Path(model_id): Path<String>) -> Result<Response, HttpError> {
    let descriptor = state
        .catalog
        .validate(state.catalog_source.as_ref(), &model_id, None, None)
        .await
        .map_err(|err| HttpError::from(gateway_core::GatewayError::from(err)))?;
    Ok(Json(to_openai_model(&descriptor)).into_response())
}

#[derive(Serialize)]
struct AvailableModel {
    id: String,
    name: String,
    provider: String,
    region: String,
    input_modalities: Vec<String>,
    output_modalities: Vec<String>,
    streaming: bool,
    legacy: bool,
}

impl From<&ModelDescriptor> for AvailableModel {
    fn from(descriptor: &ModelDescriptor) -> Self {
        Self {
            id: descriptor.id.clone(),
            name: descriptor.name.clone(),
            provider: descriptor.provider.clone(),
            region: descriptor.region.clone(),
            input_modalities: descriptor.input_modalities.clone(),
            output_modalities: descriptor.output_modalities.clone(),
            streaming: descriptor.response_streaming,
            legacy: descriptor.legacy,
        }
    }
}

#[instrument(skip(state))]
pub async fn available_models(State(state): State<AppState>) -> Response {
    let descriptors = state.catalog.list_for_response().await;
    let data: Vec<AvailableModel> = descriptors.iter().map(AvailableModel::from).collect();
    Json(data).into_response()
}
