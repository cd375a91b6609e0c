//! Text-to-speech adapter (C9), grounded in
//! `original_source/stdapi/routes/openai_audio_speech.py`.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_stream::StreamExt;

use crate::errors::GatewayError;
use crate::media::codec;
use crate::media::transcode::{self, PcmInputSpec};
use crate::providers::InferenceBackend;

use super::registry::Adapter;

const LANG_DETECT_SAMPLE_SIZE: usize = 500;
const FORMATS_REQUIRING_TRANSCODE: &[&str] = &["wav", "flac", "aac"];

/// OpenAI voice → gender lookup table used when the requested voice isn't
/// already a provider voice id.
pub fn openai_voice_gender(voice: &str) -> Option<&'static str> {
    let table: &[(&str, &str)] = &[
        ("alloy", "Female"),
        ("ash", "Male"),
        ("ballad", "Female"),
        ("coral", "Female"),
        ("echo", "Male"),
        ("fable", "Female"),
        ("nova", "Female"),
        ("onyx", "Male"),
        ("sage", "Female"),
        ("shimmer", "Female"),
        ("verse", "Male"),
    ];
    table.iter().find(|(name, _)| *name == voice).map(|(_, gender)| *gender)
}

/// Trims `text` to at most [`LANG_DETECT_SAMPLE_SIZE`] characters, cutting
/// at the last space within the window rather than mid-word, per
/// spec.md §4.5.
pub fn language_detect_sample(text: &str) -> &str {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    if chars.len() <= LANG_DETECT_SAMPLE_SIZE {
        return text;
    }
    let boundary = chars[LANG_DETECT_SAMPLE_SIZE].0;
    match text[..boundary].rfind(' ') {
        Some(pos) => &text[..pos],
        None => &text[..boundary],
    }
}

/// Voice catalog indexed the way the provider exposes it: by gender and by
/// language, so a gender+language pair can be intersected down to
/// candidate voice ids.
#[derive(Debug, Default, Clone)]
pub struct VoiceCatalog {
    pub by_gender: HashMap<String, HashSet<String>>,
    pub by_language: HashMap<String, HashSet<String>>,
    pub known_voice_ids: HashSet<String>,
}

/// Selects a provider voice id for `requested_voice`, falling back through
/// gender → detected-language → `en-US` → the literal requested name, per
/// spec.md §4.5.
pub fn select_voice(catalog: &VoiceCatalog, requested_voice: &str, detected_language: &str) -> (String, Option<String>) {
    if catalog.known_voice_ids.contains(requested_voice) {
        return (requested_voice.to_string(), None);
    }
    let Some(gender) = openai_voice_gender(requested_voice) else {
        return (requested_voice.to_string(), None);
    };
    let gender_voices = catalog.by_gender.get(gender).cloned().unwrap_or_default();

    for language in [detected_language, "en-US"] {
        if let Some(lang_voices) = catalog.by_language.get(language) {
            let mut candidates: Vec<&String> = gender_voices.intersection(lang_voices).collect();
            candidates.sort();
            if let Some(voice) = candidates.first() {
                return ((*voice).clone(), Some(language.to_string()));
            }
        }
    }
    (requested_voice.to_string(), None)
}

/// `true` when the requested output format isn't one the provider emits
/// natively and must be produced by piping PCM/OGG through an external
/// transcoder, per spec.md §4.5.
pub fn requires_transcode(output_format: &str) -> bool {
    FORMATS_REQUIRING_TRANSCODE.contains(&output_format)
}

/// The provider-native format to request when `output_format` requires
/// post-transcoding.
pub fn provider_source_format(output_format: &str) -> &'static str {
    if output_format == "aac" { "ogg_vorbis" } else { "pcm" }
}

fn content_type_for(output_format: &str) -> &'static str {
    match output_format {
        "mp3" => "audio/mpeg",
        "opus" => "audio/ogg",
        "aac" => "audio/aac",
        "flac" => "audio/x-flac",
        "wav" => "audio/wav",
        "pcm" => "audio/pcm",
        _ => "application/octet-stream",
    }
}

/// Adapter for TTS models keyed by a configurable id prefix
/// (e.g. `amazon.polly-`).
pub struct SpeechAdapter<I> {
    pub model_prefix: String,
    pub voice_catalog: VoiceCatalog,
    pub inference_backend: I,
}

#[async_trait]
impl<I> Adapter for SpeechAdapter<I>
where
    I: InferenceBackend + Send + Sync,
{
    fn matches(&self, model_id: &str) -> bool {
        model_id.starts_with(&self.model_prefix)
    }

    async fn invoke(&self, request: Value) -> Result<Value, GatewayError> {
        let model_id = request["model"].as_str().unwrap_or(&self.model_prefix).to_string();
        let text = request["input"]
            .as_str()
            .ok_or_else(|| GatewayError::InvalidRequest("`input` is required".to_string()))?;
        let requested_voice = request["voice"].as_str().unwrap_or("alloy");
        let output_format = request["response_format"].as_str().unwrap_or("mp3").to_string();

        // Production language detection is an external collaborator;
        // English is assumed here, matching the `en-US` fallback path.
        let (voice, _language) = select_voice(&self.voice_catalog, requested_voice, "en-US");

        let synth_format = if requires_transcode(&output_format) { provider_source_format(&output_format) } else { &output_format };
        let body = json!({ "Text": text, "VoiceId": voice, "OutputFormat": synth_format });
        let response = self.inference_backend.invoke(&model_id, body).await.map_err(GatewayError::from)?;

        let audio_b64 = response["AudioStream"]
            .as_str()
            .ok_or_else(|| GatewayError::Internal("provider speech response missing `AudioStream`".to_string()))?;
        let mut bytes = codec::decode_base64(audio_b64).map_err(|e| GatewayError::Internal(e.to_string()))?;

        if requires_transcode(&output_format) {
            let pcm_spec = if synth_format == "pcm" {
                Some(PcmInputSpec { sample_rate: Some(16_000), channels: Some(1) })
            } else {
                None
            };
            let stream = transcode::encode_audio_stream(bytes, &output_format, Some(synth_format), pcm_spec)
                .await
                .map_err(|e| GatewayError::Internal(e.to_string()))?;
            bytes = collect_stream(stream).await?;
        }

        Ok(json!({
            "content_type": content_type_for(&output_format),
            "audio_base64": codec::encode_base64(&bytes),
            "usage": { "input_tokens": text.chars().count(), "output_tokens": 0, "total_tokens": text.chars().count() },
        }))
    }
}

async fn collect_stream(mut stream: tokio_stream::wrappers::ReceiverStream<Result<Vec<u8>, crate::media::MediaError>>) -> Result<Vec<u8>, GatewayError> {
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk.map_err(|e| GatewayError::Internal(e.to_string()))?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_openai_voices_map_to_genders() {
        assert_eq!(openai_voice_gender("onyx"), Some("Male"));
        assert_eq!(openai_voice_gender("nova"), Some("Female"));
        assert_eq!(openai_voice_gender("not-a-voice"), None);
    }

    #[test]
    fn sample_under_limit_is_unchanged() {
        assert_eq!(language_detect_sample("hello world"), "hello world");
    }

    #[test]
    fn sample_over_limit_trims_at_last_space() {
        let text = format!("{} extra", "word ".repeat(200));
        let sample = language_detect_sample(&text);
        assert!(sample.len() <= LANG_DETECT_SAMPLE_SIZE);
        assert!(!sample.ends_with(' '));
    }

    #[test]
    fn provider_voice_id_is_used_directly() {
        let mut catalog = VoiceCatalog::default();
        catalog.known_voice_ids.insert("Joanna".to_string());
        let (voice, language) = select_voice(&catalog, "Joanna", "en-US");
        assert_eq!(voice, "Joanna");
        assert!(language.is_none());
    }

    #[test]
    fn gender_and_language_intersection_picks_a_candidate() {
        let mut catalog = VoiceCatalog::default();
        catalog.by_gender.insert("Female".to_string(), ["Joanna".to_string(), "Ivy".to_string()].into());
        catalog.by_language.insert("en-US".to_string(), ["Joanna".to_string()].into());
        let (voice, language) = select_voice(&catalog, "nova", "fr-FR");
        assert_eq!(voice, "Joanna");
        assert_eq!(language.as_deref(), Some("en-US"));
    }

    #[test]
    fn unmapped_voice_falls_back_to_literal_name() {
        let catalog = VoiceCatalog::default();
        let (voice, language) = select_voice(&catalog, "custom-voice-id", "en-US");
        assert_eq!(voice, "custom-voice-id");
        assert!(language.is_none());
    }

    #[test]
    fn wav_flac_aac_require_transcode() {
        assert!(requires_transcode("wav"));
        assert!(requires_transcode("flac"));
        assert!(requires_transcode("aac"));
        assert!(!requires_transcode("mp3"));
        assert!(!requires_transcode("ogg"));
    }

    #[test]
    fn aac_sources_from_ogg_others_from_pcm() {
        assert_eq!(provider_source_format("aac"), "ogg_vorbis");
        assert_eq!(provider_source_format("wav"), "pcm");
    }
}
