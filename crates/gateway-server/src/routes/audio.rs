//! `/v1/audio/speech`, `/v1/audio/transcriptions`, `/v1/audio/translations`.
//!
//! Speech takes a plain JSON body like chat/embeddings/images and returns
//! raw audio bytes. Transcriptions and translations take `multipart/form-data`
//! (grounded in the OpenAI upload shape) and, depending on `response_format`,
//! return either a JSON/plain-text body or an SRT/VTT attachment — the
//! adapters signal which via a `{content_type, body}` sentinel, per the
//! shape `TranscriptionAdapter`/`TranslationAdapter::invoke` already
//! produce.

use axum::extract::{Multipart, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use gateway_core::errors::GatewayError;
use serde_json::Value;
use tracing::instrument;

use crate::error::HttpError;
use crate::state::AppState;

#[instrument(skip(state, request))]
pub async fn speech(State(state): State<AppState>, Json(request): Json<Value>) -> Result<Response, HttpError> {
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

    let content_type = response["content_type"]
        .as_str()
        .ok_or_else(|| GatewayError::Internal("speech adapter response missing `content_type`".to_string()))?
        .to_string();
    let audio_b64 = response["audio_base64"]
        .as_str()
        .ok_or_else(|| GatewayError::Internal("speech adapter response missing `audio_base64`".to_string()))?;
    let bytes = gateway_core::media::codec::decode_base64(audio_b64).map_err(|e| GatewayError::Internal(e.to_string()))?;

    let mut response = Response::new(axum::body::Body::from(bytes));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type).unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );
    Ok(response)
}

/// Collects the `file`, `model`, `language`, and `response_format` fields
/// out of a multipart upload into the `{file_base64, model, ...}` shape the
/// transcription/translation adapters expect.
async fn multipart_to_request(mut multipart: Multipart, request_id: &str) -> Result<Value, GatewayError> {
    let mut model = None;
    let mut language = None;
    let mut response_format = "json".to_string();
    let mut file_bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| GatewayError::InvalidRequest(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| GatewayError::InvalidRequest(format!("failed to read `file` field: {e}")))?;
                file_bytes = Some(bytes.to_vec());
            }
            "model" => model = field.text().await.ok(),
            "language" => language = field.text().await.ok(),
            "response_format" => {
                if let Ok(value) = field.text().await {
                    response_format = value;
                }
            }
            _ => {
                let _ = field.bytes().await;
            }
        }
    }

    let model = model.ok_or_else(|| GatewayError::InvalidRequest("`model` is required".to_string()))?;
    let file_bytes = file_bytes.ok_or_else(|| GatewayError::InvalidRequest("`file` is required".to_string()))?;

    let mut request = serde_json::json!({
        "model": model,
        "file_base64": gateway_core::media::codec::encode_base64(&file_bytes),
        "response_format": response_format,
        "request_id": request_id,
    });
    if let Some(language) = language {
        request["language"] = Value::String(language);
    }
    Ok(request)
}

/// Builds the HTTP response for the transcription/translation sentinel
/// shapes: `{content_type, body}` becomes an attachment download, anything
/// else passes through as JSON.
fn respond_to_job_result(response: Value, request_id: &str) -> Response {
    let (Some(content_type), Some(body)) = (response["content_type"].as_str(), response["body"].as_str()) else {
        return Json(response).into_response();
    };

    let extension = if content_type == "text/vtt" { "vtt" } else { "srt" };
    let mut http_response = (StatusCode::OK, body.to_string()).into_response();
    http_response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap_or(HeaderValue::from_static("text/plain")));
    http_response.headers_mut().insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("attachment; filename=\"{request_id}.{extension}\""))
            .unwrap_or(HeaderValue::from_static("attachment")),
    );
    http_response
}

#[instrument(skip(state, multipart))]
pub async fn transcriptions(State(state): State<AppState>, multipart: Multipart) -> Result<Response, HttpError> {
    let request_id = uuid::Uuid::new_v4().simple().to_string();
    let request = multipart_to_request(multipart, &request_id).await?;
    let model_id = request["model"].as_str().unwrap_or_default().to_string();

    let adapter = state
        .adapters
        .resolve(&model_id)
        .await
        .ok_or_else(|| GatewayError::ModelNotFound { model: model_id.clone(), available_models: Vec::new() })?;

    let response = adapter.invoke(request).await?;
    Ok(respond_to_job_result(response, &request_id))
}

#[instrument(skip(state, multipart))]
pub async fn translations(State(state): State<AppState>, multipart: Multipart) -> Result<Response, HttpError> {
    let request_id = uuid::Uuid::new_v4().simple().to_string();
    let request = multipart_to_request(multipart, &request_id).await?;
    let model_id = request["model"].as_str().unwrap_or_default().to_string();

    let adapter = state
        .adapters
        .resolve(&model_id)
        .await
        .ok_or_else(|| GatewayError::ModelNotFound { model: model_id.clone(), available_models: Vec::new() })?;

    let response = adapter.invoke(request).await?;
    Ok(respond_to_job_result(response, &request_id))
}
