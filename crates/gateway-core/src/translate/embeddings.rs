//! Embeddings adapter (C9): input classification, sync vs. segmented
//! (async-job-runtime) dispatch, and JSONL shard concatenation, grounded in
//! `original_source/stdapi/models/embedding/amazon_nova_embed.py`'s
//! `EmbeddingModel._embed`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::GatewayError;
use crate::jobs::{self, AsyncInvokeBackend, CleanupTask, ObjectStore};
use crate::media::codec;
use crate::providers::InferenceBackend;
use crate::tokenizer::{estimate_prompt_tokens, Encoding};

use super::registry::Adapter;

/// Per-media-type synchronous invoke ceiling before the adapter falls back
/// to the segmented-embedding async path.
#[derive(Debug, Clone, Copy)]
pub struct SyncLimits {
    pub image_bytes: u64,
    pub audio_bytes: u64,
    pub video_bytes: u64,
    pub text_chars: u64,
}

impl Default for SyncLimits {
    fn default() -> Self {
        Self {
            image_bytes: 50_000_000,
            audio_bytes: 100_000_000,
            video_bytes: 100_000_000,
            text_chars: 50_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Text,
    Image,
    Audio,
    Video,
}

/// One classified input item, ready to be routed sync or async.
#[derive(Debug, Clone)]
pub struct ClassifiedInput {
    pub kind: MediaKind,
    pub format: String,
    /// `Some` when the item is already an `s3://` reference.
    pub s3_uri: Option<String>,
    /// Raw bytes for inline (non-S3) items.
    pub bytes: Option<Vec<u8>>,
    pub text: Option<String>,
}

/// Classifies one input item by content sniff, per spec.md §4.5.
pub fn classify_input(value: &str) -> ClassifiedInput {
    if let Some(uri) = value.strip_prefix("s3://") {
        let format = uri.rsplit('.').next().unwrap_or("bin").to_string();
        return ClassifiedInput {
            kind: kind_from_extension(&format),
            format,
            s3_uri: Some(value.to_string()),
            bytes: None,
            text: None,
        };
    }

    if codec::is_data_url(value) {
        if let Ok(parsed) = codec::parse_data_url(value) {
            let (kind, format) = kind_from_mime(&parsed.mime_type);
            return ClassifiedInput {
                kind,
                format,
                s3_uri: None,
                bytes: Some(parsed.bytes),
                text: None,
            };
        }
    }

    ClassifiedInput {
        kind: MediaKind::Text,
        format: "txt".to_string(),
        s3_uri: None,
        bytes: None,
        text: Some(value.to_string()),
    }
}

fn kind_from_mime(mime_type: &str) -> (MediaKind, String) {
    let format = mime_type.split('/').nth(1).unwrap_or("bin").to_string();
    let kind = if mime_type.starts_with("image/") {
        MediaKind::Image
    } else if mime_type.starts_with("audio/") {
        MediaKind::Audio
    } else if mime_type.starts_with("video/") {
        MediaKind::Video
    } else {
        MediaKind::Text
    };
    (kind, format)
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp", "tiff"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "flac", "m4a", "aac"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "webm", "mkv", "m4v"];

/// Classifies an `s3://` item by its file extension, the sniff-equivalent of
/// [`kind_from_mime`] for references whose bytes aren't inline to sniff.
fn kind_from_extension(extension: &str) -> MediaKind {
    let extension = extension.to_ascii_lowercase();
    if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        MediaKind::Image
    } else if AUDIO_EXTENSIONS.contains(&extension.as_str()) {
        MediaKind::Audio
    } else if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
        MediaKind::Video
    } else {
        MediaKind::Text
    }
}

/// Byte/char length of an inline (non-`s3://`) item; `s3://` items carry no
/// inline bytes and must have their size resolved from object metadata by
/// the caller instead.
fn inline_size(item: &ClassifiedInput) -> u64 {
    match item.kind {
        MediaKind::Text => item.text.as_deref().map(|t| t.chars().count() as u64).unwrap_or(0),
        _ => item.bytes.as_ref().map(|b| b.len() as u64).unwrap_or(0),
    }
}

/// `true` when an item of `kind` and `size` must go through the
/// segmented-embedding async path rather than a unary `invoke`, per
/// spec.md §4.5. `size` is the caller-resolved byte/char length — inline
/// length for inline items, object metadata length for `s3://` items.
pub fn exceeds_sync_limit(kind: MediaKind, size: u64, limits: &SyncLimits) -> bool {
    let limit = match kind {
        MediaKind::Text => limits.text_chars,
        MediaKind::Image => limits.image_bytes,
        MediaKind::Audio => limits.audio_bytes,
        MediaKind::Video => limits.video_bytes,
    };
    size > limit
}

/// Builds the provider-native `singleEmbeddingParams` body for one item,
/// per spec.md §4.5's unary path.
pub fn build_single_embedding_params(item: &ClassifiedInput, dimensions: Option<u32>) -> Value {
    let mut params = json!({ "embeddingPurpose": "GENERIC_INDEX" });
    if let Some(dims) = dimensions {
        params["embeddingDimension"] = json!(dims);
    }

    let source = match &item.s3_uri {
        Some(uri) => json!({ "s3Location": { "uri": uri } }),
        None => json!({ "bytes": codec::encode_base64(item.bytes.as_deref().unwrap_or_default()) }),
    };

    match item.kind {
        MediaKind::Image => params["image"] = json!({ "format": item.format, "source": source }),
        MediaKind::Audio => params["audio"] = json!({ "format": item.format, "source": source }),
        MediaKind::Video => params["video"] = json!({
            "format": item.format,
            "source": source,
            "embeddingMode": "AUDIO_VIDEO_COMBINED",
        }),
        MediaKind::Text => {
            let text_obj = match (&item.s3_uri, &item.text) {
                (Some(uri), _) => json!({ "source": { "s3Location": { "uri": uri } }, "truncationMode": "END" }),
                (None, Some(text)) => json!({ "value": text, "truncationMode": "END" }),
                (None, None) => json!({ "value": "", "truncationMode": "END" }),
            };
            params["text"] = text_obj;
        }
    }
    json!({ "taskType": "SINGLE_EMBEDDING", "singleEmbeddingParams": params })
}

/// Builds the `segmentedEmbeddingParams` body for the async path; the
/// source is always an `s3://` reference by the time this is called.
pub fn build_segmented_embedding_params(item: &ClassifiedInput, dimensions: Option<u32>) -> Value {
    let mut params = json!({ "embeddingPurpose": "GENERIC_INDEX" });
    if let Some(dims) = dimensions {
        params["embeddingDimension"] = json!(dims);
    }
    let uri = item.s3_uri.clone().unwrap_or_default();
    let source = json!({ "s3Location": { "uri": uri } });

    match item.kind {
        MediaKind::Image => params["image"] = json!({ "format": item.format, "source": source }),
        MediaKind::Audio => params["audio"] = json!({
            "format": item.format, "source": source,
            "segmentationConfig": { "durationSeconds": 5 },
        }),
        MediaKind::Video => params["video"] = json!({
            "format": item.format, "source": source,
            "embeddingMode": "AUDIO_VIDEO_COMBINED",
            "segmentationConfig": { "durationSeconds": 5 },
        }),
        MediaKind::Text => {
            params["text"] = json!({
                "source": { "s3Location": { "uri": uri } },
                "truncationMode": "END",
                "segmentationConfig": {},
            });
        }
    }
    json!({ "taskType": "SEGMENTED_EMBEDDING", "segmentedEmbeddingParams": params })
}

#[derive(Debug, Deserialize)]
struct SegmentedResult {
    status: String,
    #[serde(rename = "outputFileUri")]
    output_file_uri: Option<String>,
    #[serde(rename = "failureReason")]
    failure_reason: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SegmentedResultResponse {
    #[serde(rename = "embeddingResults")]
    embedding_results: Vec<SegmentedResult>,
}

#[derive(Debug, Deserialize)]
struct SegmentedEmbeddingLine {
    embedding: Vec<f64>,
}

fn strip_s3(uri: &str) -> Option<(&str, &str)> {
    uri.strip_prefix("s3://")?.split_once('/')
}

/// Uploads an inline item that exceeded [`SyncLimits`] so it can take the
/// segmented-embedding path, which only accepts `s3://` sources.
async fn upload_inline_item(
    item: &ClassifiedInput,
    request_id: &str,
    bucket: &str,
    object_store: &dyn ObjectStore,
) -> Result<ClassifiedInput, GatewayError> {
    let key = format!("embed-inline/{request_id}.{}", item.format);
    let bytes = match (&item.bytes, &item.text) {
        (Some(bytes), _) => bytes.clone(),
        (None, Some(text)) => text.clone().into_bytes(),
        (None, None) => Vec::new(),
    };
    object_store.put(bucket, &key, bytes).await.map_err(GatewayError::from)?;
    Ok(ClassifiedInput {
        kind: item.kind,
        format: item.format.clone(),
        s3_uri: Some(format!("s3://{bucket}/{key}")),
        bytes: None,
        text: None,
    })
}

/// Concatenates embedding vectors from the JSONL shards referenced by a
/// completed `segmented-embedding-result.json`, in manifest order, per
/// spec.md §5's ordering rule.
pub async fn concatenate_segmented_embeddings(
    manifest: &Value,
    object_store: &dyn ObjectStore,
) -> Result<(Vec<Vec<f64>>, Vec<CleanupTask>), GatewayError> {
    let parsed: SegmentedResultResponse =
        serde_json::from_value(manifest.clone()).map_err(|e| GatewayError::Internal(format!("malformed segmented embedding manifest: {e}")))?;

    let mut cleanup = Vec::new();
    let mut vectors = Vec::new();
    for result in &parsed.embedding_results {
        if result.status != "SUCCESS" {
            let reason = result.failure_reason.as_deref().unwrap_or("UNKNOWN");
            let message = result.message.as_deref().unwrap_or("segmented embedding failed");
            return Err(GatewayError::ProviderValidation {
                message: format!("{reason}: {message}"),
                code: None,
            });
        }
        let uri = result.output_file_uri.as_deref().unwrap_or_default();
        let Some((bucket, key)) = strip_s3(uri) else { continue };
        cleanup.push(CleanupTask::DeleteObject { bucket: bucket.to_string(), key: key.to_string() });

        let bytes = object_store.get(bucket, key).await.map_err(GatewayError::from)?;
        let text = String::from_utf8_lossy(&bytes);
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let parsed_line: SegmentedEmbeddingLine =
                serde_json::from_str(line).map_err(|e| GatewayError::Internal(format!("malformed embedding shard line: {e}")))?;
            vectors.push(parsed_line.embedding);
        }
    }
    Ok((vectors, cleanup))
}

/// Estimates `prompt_tokens` when the provider response carries no usage,
/// per spec.md §4.5.
pub fn estimate_embedding_prompt_tokens<'a>(texts: impl IntoIterator<Item = &'a str>) -> u32 {
    estimate_prompt_tokens(texts, Encoding::Cl100kBase)
}

/// Extracts the flat embedding vector out of a unary `singleEmbeddingParams`
/// response (`{"embeddings": [{"embedding": [...]}]}`).
fn extract_single_embedding(response: &Value) -> Result<Vec<f64>, GatewayError> {
    response["embeddings"][0]["embedding"]
        .as_array()
        .map(|values| values.iter().filter_map(Value::as_f64).collect())
        .ok_or_else(|| GatewayError::Internal("provider embedding response missing `embeddings[0].embedding`".to_string()))
}

/// Adapter over an [`InferenceBackend`] (unary path) and an
/// [`AsyncInvokeBackend`]/[`ObjectStore`] pair (segmented path) for models
/// matching a configurable id prefix (e.g. `amazon.nova-2-multimodal-embeddings`).
pub struct EmbeddingsAdapter<I, B, S> {
    pub model_prefix: String,
    pub bucket: String,
    pub limits: SyncLimits,
    pub inference_backend: I,
    pub invoke_backend: B,
    pub object_store: S,
}

#[async_trait]
impl<I, B, S> Adapter for EmbeddingsAdapter<I, B, S>
where
    I: InferenceBackend + Send + Sync,
    B: AsyncInvokeBackend + Send + Sync,
    S: ObjectStore + Send + Sync,
{
    fn matches(&self, model_id: &str) -> bool {
        model_id.starts_with(&self.model_prefix)
    }

    async fn invoke(&self, request: Value) -> Result<Value, GatewayError> {
        let model_id = request["model"].as_str().unwrap_or(&self.model_prefix).to_string();
        let inputs: Vec<String> = match &request["input"] {
            Value::String(s) => vec![s.clone()],
            Value::Array(items) => items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
            _ => return Err(GatewayError::InvalidRequest("`input` must be a string or array of strings".to_string())),
        };
        let dimensions = request["dimensions"].as_u64().map(|d| d as u32);

        let mut embeddings = Vec::with_capacity(inputs.len());
        for (index, raw) in inputs.iter().enumerate() {
            let item = classify_input(raw);
            let request_id = format!("embed-{index}");

            let size = match &item.s3_uri {
                Some(uri) => {
                    let (bucket, key) = strip_s3(uri)
                        .ok_or_else(|| GatewayError::InvalidRequest(format!("malformed s3 uri: {uri}")))?;
                    self.object_store.size(bucket, key).await.map_err(GatewayError::from)?
                }
                None => inline_size(&item),
            };

            if exceeds_sync_limit(item.kind, size, &self.limits) {
                let item = if item.s3_uri.is_some() {
                    item
                } else {
                    upload_inline_item(&item, &request_id, &self.bucket, &self.object_store).await?
                };
                let payload = build_segmented_embedding_params(&item, dimensions);
                let (result, cleanup) =
                    jobs::run_async_json(&model_id, payload, &request_id, &self.bucket, &self.object_store, &self.invoke_backend).await;
                let manifest = result.map_err(GatewayError::from)?;
                let (vectors, mut shard_cleanup) = concatenate_segmented_embeddings(&manifest, &self.object_store).await?;
                let mut all_cleanup = cleanup;
                all_cleanup.append(&mut shard_cleanup);
                jobs::run_cleanup(all_cleanup, &self.object_store, &self.invoke_backend).await;
                embeddings.extend(vectors);
            } else {
                let payload = build_single_embedding_params(&item, dimensions);
                let response = self.inference_backend.invoke(&model_id, payload).await.map_err(GatewayError::from)?;
                embeddings.push(extract_single_embedding(&response)?);
            }
        }

        let prompt_tokens = estimate_embedding_prompt_tokens(inputs.iter().map(String::as_str));
        Ok(json!({
            "object": "list",
            "data": embeddings.into_iter().enumerate().map(|(index, embedding)| json!({
                "object": "embedding",
                "index": index,
                "embedding": embedding,
            })).collect::<Vec<_>>(),
            "model": model_id,
            "usage": { "prompt_tokens": prompt_tokens, "total_tokens": prompt_tokens },
        }))
    }
}
