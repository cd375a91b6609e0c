//! Image-generation adapter (C9), grounded in
//! `original_source/stdapi/routes/openai_images_generations.py` and
//! `original_source/stdapi/models/image/amazon_titan_image_generator.py`.

use async_trait::async_trait;
use rand::Rng;
use serde_json::{json, Value};

use crate::errors::GatewayError;
use crate::jobs::ObjectStore;
use crate::media::image;
use crate::providers::InferenceBackend;

use super::registry::Adapter;

/// OpenAI's `quality` levels collapse onto two provider tiers, per
/// spec.md §4.5.
pub fn map_quality(quality: &str) -> &'static str {
    match quality {
        "hd" | "high" => "premium",
        _ => "standard",
    }
}

/// Request fields this adapter knows how to translate; anything else in
/// the request body that isn't one of these and isn't explicitly ignorable
/// is an unsupported-parameter rejection.
const SUPPORTED_FIELDS: &[&str] = &[
    "model", "prompt", "n", "size", "quality", "style", "response_format",
    "output_format", "output_compression", "stream", "partial_images", "user",
];

pub fn reject_unsupported_params(request: &Value) -> Result<(), GatewayError> {
    if let Some(obj) = request.as_object() {
        for key in obj.keys() {
            if !SUPPORTED_FIELDS.contains(&key.as_str()) {
                return Err(GatewayError::UnsupportedParameter { param: key.clone() });
            }
        }
    }
    Ok(())
}

/// Generates a random seed the way the provider expects when the caller
/// doesn't pin one, per spec.md §4.5 ("seed is randomly sampled").
pub fn random_seed() -> u32 {
    rand::thread_rng().gen_range(0..2_147_483_647)
}

pub fn parse_size(size: &str) -> Result<(u32, u32), GatewayError> {
    let (w, h) = size
        .split_once('x')
        .ok_or_else(|| GatewayError::InvalidRequest(format!("invalid `size`: {size}")))?;
    let width: u32 = w.parse().map_err(|_| GatewayError::InvalidRequest(format!("invalid `size`: {size}")))?;
    let height: u32 = h.parse().map_err(|_| GatewayError::InvalidRequest(format!("invalid `size`: {size}")))?;
    Ok((width, height))
}

/// Builds the provider-native text-to-image request body.
pub fn build_generation_request(prompt: &str, width: u32, height: u32, quality: &str, n: u32) -> Value {
    json!({
        "taskType": "TEXT_IMAGE",
        "textToImageParams": { "text": prompt },
        "imageGenerationConfig": {
            "numberOfImages": n,
            "width": width,
            "height": height,
            "quality": map_quality(quality),
            "seed": random_seed(),
            "cfgScale": 8.0,
        }
    })
}

fn extract_images_base64(response: &Value) -> Vec<String> {
    response["images"]
        .as_array()
        .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

/// Re-encodes provider-native image bytes (assumed PNG, the typical
/// provider-native format) into `output_format` when it differs, per
/// spec.md §4.5's "output format differs from the provider's native format".
pub fn maybe_transcode(bytes: &[u8], output_format: &str) -> Result<Vec<u8>, GatewayError> {
    if output_format.eq_ignore_ascii_case("png") {
        return Ok(bytes.to_vec());
    }
    let format = image::parse_output_format(output_format).map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;
    image::reformat(bytes, format, None).map_err(|e| GatewayError::Internal(e.to_string()))
}

const PRESIGN_TTL_SECS: u64 = 3600;

/// Adapter for text-to-image models keyed by a configurable id prefix
/// (e.g. `amazon.nova-canvas`, `amazon.titan-image-generator`).
pub struct ImagesAdapter<I, S> {
    pub model_prefix: String,
    pub bucket: String,
    pub inference_backend: I,
    pub object_store: S,
}

#[async_trait]
impl<I, S> Adapter for ImagesAdapter<I, S>
where
    I: InferenceBackend + Send + Sync,
    S: ObjectStore + Send + Sync,
{
    fn matches(&self, model_id: &str) -> bool {
        model_id.starts_with(&self.model_prefix)
    }

    async fn invoke(&self, request: Value) -> Result<Value, GatewayError> {
        reject_unsupported_params(&request)?;
        let model_id = request["model"].as_str().unwrap_or(&self.model_prefix).to_string();
        let prompt = request["prompt"]
            .as_str()
            .ok_or_else(|| GatewayError::InvalidRequest("`prompt` is required".to_string()))?;
        let n = request["n"].as_u64().unwrap_or(1).max(1) as u32;
        let (width, height) = parse_size(request["size"].as_str().unwrap_or("1024x1024"))?;
        let quality = request["quality"].as_str().unwrap_or("standard");
        let output_format = request["output_format"].as_str().unwrap_or("png").to_string();
        let response_format = request["response_format"].as_str().unwrap_or("b64_json");

        let body = build_generation_request(prompt, width, height, quality, n);
        let response = self.inference_backend.invoke(&model_id, body).await.map_err(GatewayError::from)?;

        let mut images = Vec::new();
        for (index, b64) in extract_images_base64(&response).into_iter().enumerate() {
            let bytes = crate::media::codec::decode_base64(&b64).map_err(|e| GatewayError::Internal(e.to_string()))?;
            let transcoded = maybe_transcode(&bytes, &output_format)?;

            if response_format == "url" {
                let key = format!("{}/image-{}.{}", uuid::Uuid::new_v4(), index, output_format);
                self.object_store.put(&self.bucket, &key, transcoded).await.map_err(GatewayError::from)?;
                let url = self
                    .object_store
                    .presigned_url(&self.bucket, &key, PRESIGN_TTL_SECS)
                    .await
                    .map_err(GatewayError::from)?;
                images.push(json!({ "url": url }));
            } else {
                images.push(json!({ "b64_json": crate::media::codec::encode_base64(&transcoded) }));
            }
        }

        Ok(json!({
            "created": chrono::Utc::now().timestamp(),
            "data": images,
            "output_format": output_format,
            "size": format!("{width}x{height}"),
            "background": "opaque",
            "quality": quality,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_tiers_collapse_to_standard_or_premium() {
        assert_eq!(map_quality("low"), "standard");
        assert_eq!(map_quality("medium"), "standard");
        assert_eq!(map_quality("standard"), "standard");
        assert_eq!(map_quality("high"), "premium");
        assert_eq!(map_quality("hd"), "premium");
    }

    #[test]
    fn unsupported_parameter_is_rejected() {
        let request = json!({ "prompt": "a fox", "logit_bias": {} });
        let err = reject_unsupported_params(&request).unwrap_err();
        assert!(matches!(err, GatewayError::UnsupportedParameter { param } if param == "logit_bias"));
    }

    #[test]
    fn size_parses_width_and_height() {
        assert_eq!(parse_size("1024x768").unwrap(), (1024, 768));
        assert!(parse_size("bogus").is_err());
    }

    #[test]
    fn generation_request_carries_mapped_quality_and_dimensions() {
        let body = build_generation_request("a fox", 512, 512, "hd", 2);
        assert_eq!(body["imageGenerationConfig"]["quality"], "premium");
        assert_eq!(body["imageGenerationConfig"]["numberOfImages"], 2);
    }

    #[tokio::test]
    async fn adapter_invoke_returns_base64_for_default_response_format() {
        use crate::jobs::JobError;
        use crate::providers::ProviderError;
        use tokio_stream::wrappers::ReceiverStream;

        let png_bytes = {
            let rgb = ::image::RgbImage::from_pixel(2, 2, ::image::Rgb([10, 20, 30]));
            let mut out = std::io::Cursor::new(Vec::new());
            ::image::DynamicImage::ImageRgb8(rgb).write_to(&mut out, ::image::ImageFormat::Png).unwrap();
            out.into_inner()
        };
        let b64 = crate::media::codec::encode_base64(&png_bytes);

        struct StubInference {
            image_b64: String,
        }
        #[async_trait]
        impl InferenceBackend for StubInference {
            async fn invoke(&self, _model_id: &str, _body: Value) -> Result<Value, ProviderError> {
                Ok(json!({ "images": [self.image_b64.clone()] }))
            }
            async fn invoke_stream(&self, _m: &str, _b: Value) -> Result<ReceiverStream<Result<Value, ProviderError>>, ProviderError> {
                let (_tx, rx) = tokio::sync::mpsc::channel(1);
                Ok(ReceiverStream::new(rx))
            }
        }

        struct UnusedStore;
        #[async_trait]
        impl ObjectStore for UnusedStore {
            async fn put(&self, _b: &str, _k: &str, _v: Vec<u8>) -> Result<(), JobError> {
                unreachable!()
            }
            async fn get(&self, _b: &str, _k: &str) -> Result<Vec<u8>, JobError> {
                unreachable!()
            }
            async fn delete(&self, _b: &str, _k: &str) -> Result<(), JobError> {
                unreachable!()
            }
            async fn list_prefix(&self, _b: &str, _p: &str) -> Result<Vec<String>, JobError> {
                unreachable!()
            }
            async fn presigned_url(&self, _b: &str, _k: &str, _t: u64) -> Result<String, JobError> {
                unreachable!()
            }
        }

        let adapter = ImagesAdapter {
            model_prefix: "amazon.nova-canvas".to_string(),
            bucket: "bucket".to_string(),
            inference_backend: StubInference { image_b64: b64 },
            object_store: UnusedStore,
        };

        let response = adapter
            .invoke(json!({ "model": "amazon.nova-canvas-v1:0", "prompt": "a fox", "size": "2x2" }))
            .await
            .unwrap();
        assert!(response["data"][0]["b64_json"].is_string());
        assert_eq!(response["size"], "2x2");
    }
}
