//! `POST /v1/chat/completions`, grounded in the teacher's
//! `handler.rs`/`gateway/streaming.rs` split: translate the OpenAI body,
//! dispatch unary or streaming against the resolved backend, translate the
//! result back.

use std::sync::Arc;

use async_openai::types::chat::CreateChatCompletionRequest;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use futures_util::StreamExt;
use gateway_core::context::RequestContext;
use gateway_core::errors::{map_provider_error, GatewayError};
use gateway_core::observability::{level_for_status, EventLog, LogLevel};
use gateway_core::providers::InferenceBackend;
use gateway_core::translate::chat::{
    assemble_response, attach_audio, build_choice, extract_content, sum_usage, translate_request,
    AudioAttachment, RequestTranslationContext, TranslatedRequest,
};
use gateway_core::translate::chat::streaming::{attach_usage_to_chunk, translate_stream_event, ChunkAccumulator};
use gateway_core::translate::converse::{
    parse_stream_event, ConverseResponse, ConverseStreamEvent, ConverseTokenUsage, GuardrailConfiguration,
};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::instrument;

use crate::error::HttpError;
use crate::state::AppState;

/// Models whose reasoning is surfaced as a `thinking` block in
/// `additionalModelRequestFields` rather than a bare `reasoning_config`
/// string, per spec.md §4.4's reasoning-effort mapping. Nova's reasoning
/// models take the string form; Claude's extended-thinking models take the
/// structured form.
fn reasoning_shape(model_id: &str) -> (bool, bool) {
    if model_id.contains("claude-3-7") || model_id.contains("claude-opus-4") || model_id.contains("claude-sonnet-4") {
        (true, false)
    } else if model_id.contains("nova-premier") {
        (true, true)
    } else {
        (false, false)
    }
}

fn guardrail_config(request_context: &RequestContext) -> Option<GuardrailConfiguration> {
    let guardrail = request_context.guardrail.as_ref()?;
    Some(GuardrailConfiguration {
        guardrail_identifier: guardrail.identifier.clone(),
        guardrail_version: guardrail.version.clone(),
        trace: guardrail.trace.clone(),
    })
}

const ROUTE: &str = "/v1/chat/completions";

enum ChatOutcome {
    Unary(Response),
    Stream(Response),
}

#[instrument(skip(state, body))]
pub async fn chat_completions(
    State(state): State<AppState>,
    Extension(request_context): Extension<RequestContext>,
    Json(body): Json<Value>,
) -> Result<Response, HttpError> {
    let model_id = body["model"].as_str().unwrap_or_default().to_string();
    let outcome = run_chat_completions(&state, &request_context, &model_id, body).await;

    match &outcome {
        Ok(ChatOutcome::Unary(_)) => EventLog::Request {
            date: chrono::Utc::now(),
            server_id: state.server_id.to_string(),
            server_version: state.server_version.to_string(),
            level: LogLevel::Info,
            request_id: request_context.request_id.clone(),
            model_id: Some(model_id.clone()),
            route: ROUTE.to_string(),
            status_code: 200,
            duration_ms: request_context.elapsed_ms(),
            error_detail: None,
        }
        .emit(),
        Ok(ChatOutcome::Stream(_)) => {}
        Err(err) => {
            let status_code = err.http_status();
            EventLog::Request {
                date: chrono::Utc::now(),
                server_id: state.server_id.to_string(),
                server_version: state.server_version.to_string(),
                level: level_for_status(status_code),
                request_id: request_context.request_id.clone(),
                model_id: Some(model_id.clone()),
                route: ROUTE.to_string(),
                status_code,
                duration_ms: request_context.elapsed_ms(),
                error_detail: Some(err.to_string()),
            }
            .emit();
        }
    }

    outcome.map(|o| match o {
        ChatOutcome::Unary(response) => response,
        ChatOutcome::Stream(response) => response,
    })
    .map_err(HttpError::from)
}

async fn run_chat_completions(
    state: &AppState,
    request_context: &RequestContext,
    model_id: &str,
    body: Value,
) -> Result<ChatOutcome, GatewayError> {
    state
        .catalog
        .validate(state.catalog_source.as_ref(), model_id, Some("TEXT"), Some("TEXT"))
        .await
        .map_err(GatewayError::from)?;

    let request: CreateChatCompletionRequest = serde_json::from_value(body.clone())
        .map_err(|e| GatewayError::InvalidRequest(format!("invalid chat completion request: {e}")))?;

    if request.messages.is_empty() {
        return Err(GatewayError::InvalidRequest("`messages` must contain at least one item".to_string()));
    }

    let audio_params = audio_modality(&body)?;

    let (requires_reasoning, uses_string_reasoning) = reasoning_shape(model_id);
    let ctx = RequestTranslationContext {
        model_requires_reasoning: requires_reasoning,
        model_uses_string_reasoning_config: uses_string_reasoning,
        default_model_params: state.config.default_model_params.clone(),
        guardrail: guardrail_config(request_context),
        thinking_budget: body.get("thinking_budget").and_then(Value::as_u64),
        enable_thinking: body.get("enable_thinking").and_then(Value::as_bool),
    };

    let translated: TranslatedRequest = translate_request(&request, &ctx, &state.media_resolver).await?;
    let legacy_function_call = translated.legacy_function_call;
    let stream = request.stream.unwrap_or(false);
    let include_usage = request
        .stream_options
        .as_ref()
        .and_then(|options| options.include_usage)
        .unwrap_or(false);
    let choice_count = request.n.unwrap_or(1).max(1);

    if stream && choice_count > 1 {
        return Err(GatewayError::UnsupportedParameter { param: "n".to_string() });
    }

    let converse_request = translated.into_converse_request(None);
    let body = serde_json::to_value(&converse_request).map_err(|e| GatewayError::Internal(e.to_string()))?;

    if stream {
        let stream = stream_chat_completion(
            state.chat_backend.clone(),
            model_id.to_string(),
            body,
            include_usage,
            legacy_function_call,
            state.server_id.to_string(),
            state.server_version.to_string(),
            request_context.request_id.clone(),
        )
        .await?;
        let body_stream = stream.map(|frame| match frame {
            Ok(payload) => format!("data: {payload}\n\n"),
            Err(err) => format!("data: {}\n\n", serde_json::to_string(&err.into_envelope()).unwrap_or_default()),
        });
        let terminal = futures_util::stream::once(async { "data: [DONE]\n\n".to_string() });
        let sse_body = body_stream.chain(terminal).map(|frame| Ok::<_, std::convert::Infallible>(frame));

        let mut response = Response::new(Body::from_stream(sse_body));
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
        response
            .headers_mut()
            .insert("cache-control", HeaderValue::from_static("no-cache"));
        return Ok(ChatOutcome::Stream(response));
    }

    let mut responses: Vec<ConverseResponse> = Vec::with_capacity(choice_count as usize);
    for _ in 0..choice_count {
        let value = state.chat_backend.invoke(model_id, body.clone()).await.map_err(GatewayError::from)?;
        let converse_response: ConverseResponse =
            serde_json::from_value(value).map_err(|e| GatewayError::Internal(e.to_string()))?;
        responses.push(converse_response);
    }

    let reasoning_present = responses.iter().any(|resp| {
        resp.output
            .message
            .content
            .iter()
            .any(|block| matches!(block, gateway_core::translate::converse::ContentBlock::ReasoningContent { .. }))
    });

    let choices = responses
        .iter()
        .enumerate()
        .map(|(index, resp)| build_choice(index as u32, resp, legacy_function_call))
        .collect();
    let usage = sum_usage(&responses, reasoning_present);
    let response = assemble_response(model_id.to_string(), choices, usage);

    let Some(audio_params) = audio_params else {
        return Ok(ChatOutcome::Unary(Json(response).into_response()));
    };

    let mut value = serde_json::to_value(&response).map_err(|e| GatewayError::Internal(e.to_string()))?;
    let completion_id = value["id"].as_str().unwrap_or_default().to_string();
    let created = value["created"].as_i64().unwrap_or_default();
    let tts_model = state
        .config
        .default_tts_model
        .as_deref()
        .ok_or_else(|| GatewayError::Internal("no default text-to-speech model configured".to_string()))?;
    let tts_adapter = state
        .adapters
        .resolve(tts_model)
        .await
        .ok_or_else(|| GatewayError::ModelNotFound { model: tts_model.to_string(), available_models: Vec::new() })?;

    for (index, resp) in responses.iter().enumerate() {
        let text = extract_content(resp).text;
        if text.is_empty() {
            continue;
        }
        let synth_format = if audio_params.format == "pcm16" { "pcm" } else { audio_params.format.as_str() };
        let tts_request = serde_json::json!({
            "model": tts_model,
            "input": text,
            "voice": audio_params.voice,
            "response_format": synth_format,
        });
        let tts_response = tts_adapter.invoke(tts_request).await?;
        let data_base64 = tts_response["audio_base64"]
            .as_str()
            .ok_or_else(|| GatewayError::Internal("speech adapter response missing `audio_base64`".to_string()))?
            .to_string();
        let audio = AudioAttachment {
            id: format!("audio-{completion_id}-{index}"),
            data_base64,
            transcript: text,
            // Audio is synthesized inline and never persisted, so it expires immediately.
            expires_at: created,
        };
        attach_audio(&mut value["choices"][index], audio);
    }

    Ok(ChatOutcome::Unary(Json(value).into_response()))
}

struct AudioModalityParams {
    voice: String,
    format: String,
}

/// Validates `modalities`/`audio`/`stream` the way the OpenAI-compatible
/// surface does: `audio` modality requires `text` alongside it, is
/// incompatible with streaming, and requires `audio` parameters to be set.
fn audio_modality(body: &Value) -> Result<Option<AudioModalityParams>, GatewayError> {
    let modalities: Option<Vec<&str>> =
        body.get("modalities").and_then(Value::as_array).map(|arr| arr.iter().filter_map(Value::as_str).collect());

    let Some(modalities) = modalities.filter(|m| m.contains(&"audio")) else {
        return Ok(None);
    };

    if !modalities.contains(&"text") {
        return Err(GatewayError::InvalidRequest(
            "Invalid value for 'modalities'. Only ['text'] and ['text', 'audio'] are supported.".to_string(),
        ));
    }
    if body.get("stream").and_then(Value::as_bool).unwrap_or(false) {
        return Err(GatewayError::InvalidRequest("Audio output with streaming is not supported on this backend.".to_string()));
    }
    let audio = body
        .get("audio")
        .filter(|v| !v.is_null())
        .ok_or_else(|| GatewayError::InvalidRequest("`audio` parameters are required when requesting audio output modality.".to_string()))?;
    let voice = audio["voice"]
        .as_str()
        .ok_or_else(|| GatewayError::InvalidRequest("`audio.voice` is required".to_string()))?
        .to_string();
    let format = audio["format"].as_str().unwrap_or("mp3").to_string();
    Ok(Some(AudioModalityParams { voice, format }))
}

#[allow(clippy::too_many_arguments)]
async fn stream_chat_completion(
    backend: Arc<dyn InferenceBackend>,
    model: String,
    body: Value,
    include_usage: bool,
    legacy_function_call: bool,
    server_id: String,
    server_version: String,
    request_id: String,
) -> Result<ReceiverStream<Result<Value, GatewayError>>, GatewayError> {
    let mut provider_stream = backend.invoke_stream(&model, body).await?;
    let (tx, rx) = mpsc::channel(16);
    let started_at = std::time::Instant::now();

    tokio::spawn(async move {
        let mut accumulator = ChunkAccumulator::new();
        let mut last_usage: Option<ConverseTokenUsage> = None;
        let mut chunks_emitted: u64 = 0;
        let mut error_detail: Option<String> = None;

        while let Some(item) = provider_stream.next().await {
            let value = match item {
                Ok(value) => value,
                Err(err) => {
                    let err = GatewayError::from(err);
                    error_detail = Some(err.to_string());
                    let _ = tx.send(Err(err)).await;
                    break;
                }
            };

            let event = match parse_stream_event(&value) {
                Ok(event) => event,
                Err((code, message)) => {
                    let err = map_provider_error(&code, message);
                    error_detail = Some(err.to_string());
                    let _ = tx.send(Err(err)).await;
                    break;
                }
            };

            if let ConverseStreamEvent::Metadata { usage: Some(usage) } = &event {
                last_usage = Some(usage.clone());
            }

            let is_stop = matches!(event, ConverseStreamEvent::MessageStop { .. });
            let chunks = translate_stream_event(&event, &mut accumulator, &model, 0, legacy_function_call);

            let mut send_failed = false;
            for mut chunk in chunks {
                if is_stop && include_usage {
                    if let Some(usage) = &last_usage {
                        attach_usage_to_chunk(&mut chunk, usage);
                    }
                }
                let payload = serde_json::to_value(&chunk).expect("stream chunk serializes to JSON");
                if tx.send(Ok(payload)).await.is_err() {
                    send_failed = true;
                    break;
                }
                chunks_emitted += 1;
            }

            if send_failed || is_stop {
                break;
            }
        }

        EventLog::RequestStream {
            date: chrono::Utc::now(),
            server_id,
            server_version,
            level: error_detail.as_ref().map(|_| level_for_status(500)).unwrap_or(LogLevel::Info),
            request_id,
            model_id: Some(model),
            route: ROUTE.to_string(),
            duration_ms: started_at.elapsed().as_millis() as i64,
            chunks_emitted,
            error_detail,
        }
        .emit();
    });

    Ok(ReceiverStream::new(rx))
}
