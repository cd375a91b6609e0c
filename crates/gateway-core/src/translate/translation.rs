//! Audio-to-English-text adapter (C9), grounded in
//! `original_source/stdapi/routes/openai_audio_translations.py`. Shares the
//! upload/poll/fetch job pipeline with [`super::transcription`], then runs
//! auto-detected source text through a translation pass.

use async_trait::async_trait;
use regex::RegexBuilder;
use serde_json::{json, Value};

use crate::errors::GatewayError;
use crate::jobs::{AsyncInvokeBackend, ObjectStore};
use crate::tokenizer::{estimate_tokens, Encoding};
use crate::translate::transcription::{transcript_text, TranscriptionAdapter, TranscriptionJobData};

use super::registry::Adapter;

/// A translation backend for English output, keyed off the job's
/// auto-detected source language. Mirrors `translate_text_to_english`'s
/// shape so other providers can be swapped in behind the same trait.
#[async_trait]
pub trait TextTranslator: Send + Sync {
    async fn translate(&self, text: &str, source_language_code: &str, target_language_code: &str) -> Result<String, GatewayError>;
}

/// Strips a region suffix (`es-US` → `es`) and skips the call entirely when
/// the source is already English, per `translate_text_to_english`.
pub async fn translate_text_to_english(translator: &dyn TextTranslator, text: &str, source_language_code: &str) -> Result<String, GatewayError> {
    let base_language = source_language_code.split('-').next().unwrap_or(source_language_code);
    if text.trim().is_empty() || base_language == "en" {
        return Ok(text.to_string());
    }
    translator.translate(text, base_language, "en").await
}

/// `reqwest`-backed [`TextTranslator`] against a configurable base URL,
/// the production default alongside [`crate::providers::HttpInferenceClient`]
/// and [`crate::catalog::HttpCatalogSource`]; the concrete translation
/// provider SDK remains an external collaborator (spec.md §1).
pub struct HttpTextTranslator {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTextTranslator {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into() }
    }
}

#[async_trait]
impl TextTranslator for HttpTextTranslator {
    async fn translate(&self, text: &str, source_language_code: &str, target_language_code: &str) -> Result<String, GatewayError> {
        let url = format!("{}/translate", self.base_url);
        let body = json!({
            "text": text,
            "sourceLanguageCode": source_language_code,
            "targetLanguageCode": target_language_code,
        });
        let response = self.client.post(&url).json(&body).send().await.map_err(|e| GatewayError::Internal(e.to_string()))?;
        if !response.status().is_success() {
            return Err(GatewayError::Internal(format!("POST {url} returned {}", response.status())));
        }
        #[derive(serde::Deserialize)]
        struct TranslateResponse {
            #[serde(rename = "translatedText")]
            translated_text: String,
        }
        let parsed: TranslateResponse = response.json().await.map_err(|e| GatewayError::Internal(e.to_string()))?;
        Ok(parsed.translated_text)
    }
}

fn is_subtitle_text_line(stripped: &str) -> bool {
    !stripped.is_empty() && stripped.parse::<u64>().is_err() && !stripped.contains("-->")
}

/// Splits SRT/VTT content into translatable text segments, skipping the
/// leading WebVTT header, sequence numbers, and timing lines, per
/// `extract_subtitle_text_segments`.
pub fn extract_subtitle_text_segments(subtitle_content: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = Vec::new();
    let mut header_done = false;

    for line in subtitle_content.trim().split('\n') {
        let stripped = line.trim();
        if !header_done {
            header_done = stripped.parse::<u64>().is_ok();
            continue;
        }
        if is_subtitle_text_line(stripped) {
            current.push(line.to_string());
        } else if stripped.is_empty() {
            if !current.is_empty() {
                segments.push(current.join("\n"));
                current.clear();
            }
        }
    }
    if !current.is_empty() {
        segments.push(current.join("\n"));
    }
    segments
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;").replace('\'', "&#x27;")
}

fn unescape_html(text: &str) -> String {
    text.replace("&#x27;", "'").replace("&quot;", "\"").replace("&gt;", ">").replace("&lt;", "<").replace("&amp;", "&")
}

/// Wraps each segment in an `id`-tagged `<span>` so a single translate call
/// covers the whole subtitle file, per `create_html_for_translation`.
pub fn create_html_for_translation(text_segments: &[String]) -> String {
    let mut html = String::from("<!DOCTYPE html><html><body>");
    for (i, segment) in text_segments.iter().enumerate() {
        html.push_str(&format!("<span id=\"seg{i}\">{}</span>\n", escape_html(segment)));
    }
    html.push_str("</body></html>");
    html
}

/// Extracts each `<span id="segN">` body back out in order, per
/// `parse_translated_html`.
pub fn parse_translated_html(translated_html: &str, segment_count: usize) -> Result<Vec<String>, GatewayError> {
    let mut segments = Vec::with_capacity(segment_count);
    for i in 0..segment_count {
        let pattern = format!(r#"<span[^>]*id="seg{i}"[^>]*>(.*?)</span>"#);
        let re = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .dot_matches_new_line(true)
            .build()
            .map_err(|e| GatewayError::Internal(e.to_string()))?;
        let captured = re
            .captures(translated_html)
            .and_then(|c| c.get(1))
            .ok_or_else(|| GatewayError::Internal("unable to parse translated HTML".to_string()))?;
        segments.push(unescape_html(captured.as_str()));
    }
    Ok(segments)
}

/// Splices translated segments back into `original_content` in place,
/// preserving everything between segments (timing lines, blank lines,
/// sequence numbers), per `reconstruct_subtitle_with_translation`.
pub fn reconstruct_subtitle_with_translation(original_content: &str, text_segments: &[String], translated_segments: &[String]) -> String {
    let mut result = String::new();
    let mut current_pos = 0usize;
    for (text, translated) in text_segments.iter().zip(translated_segments.iter()) {
        let Some(relative) = original_content[current_pos..].find(text.as_str()) else {
            continue;
        };
        let segment_start = current_pos + relative;
        result.push_str(&original_content[current_pos..segment_start]);
        result.push_str(translated);
        current_pos = segment_start + text.len();
    }
    result.push_str(&original_content[current_pos..]);
    result
}

/// Runs the full span-wrap/translate/unwrap round trip for one subtitle
/// file, per `translate_subtitle_content`.
pub async fn translate_subtitle_content(translator: &dyn TextTranslator, subtitle_content: &str, source_language_code: &str) -> Result<String, GatewayError> {
    let text_segments = extract_subtitle_text_segments(subtitle_content);
    if text_segments.is_empty() {
        return Ok(subtitle_content.to_string());
    }

    let html = create_html_for_translation(&text_segments);
    let translated_html = translate_text_to_english(translator, &html, source_language_code).await?;
    let translated_segments = parse_translated_html(&translated_html, text_segments.len())?;
    Ok(reconstruct_subtitle_with_translation(subtitle_content, &text_segments, &translated_segments))
}

fn estimate_usage_tokens(text: &str) -> Value {
    let tokens = estimate_tokens(text, Encoding::Cl100kBase);
    json!({ "type": "tokens", "input_tokens": 0, "output_tokens": tokens, "total_tokens": tokens })
}

fn build_translation_response(data: &TranscriptionJobData, text: &str, response_format: &str) -> Value {
    if response_format == "text" {
        return json!({ "text": text });
    }
    if response_format == "verbose_json" {
        return json!({
            "text": text,
            "language": "english",
            "duration": 0.0,
            "segments": data.audio_segments.iter().map(|segment| json!({
                "id": segment.id,
                "start": segment.start_time.parse::<f64>().unwrap_or(0.0),
                "end": segment.end_time.parse::<f64>().unwrap_or(0.0),
                "text": segment.transcript,
                "no_speech_prob": if segment.transcript.is_empty() { 1.0 } else { 0.0 },
                "avg_logprob": 0.0,
                "compression_ratio": 0.0,
                "seek": 0,
                "temperature": 0.0,
                "tokens": Vec::<i64>::new(),
            })).collect::<Vec<_>>(),
        });
    }
    json!({ "text": text, "usage": estimate_usage_tokens(text) })
}

/// Adapter that transcribes with auto language detection and translates the
/// result to English (spec.md §4.5's `/v1/audio/translations`).
pub struct TranslationAdapter<B, S, T> {
    pub transcription: TranscriptionAdapter<B, S>,
    pub translator: T,
}

#[async_trait]
impl<B, S, T> Adapter for TranslationAdapter<B, S, T>
where
    B: AsyncInvokeBackend + Send + Sync,
    S: ObjectStore + Send + Sync,
    T: TextTranslator,
{
    fn matches(&self, model_id: &str) -> bool {
        self.transcription.matches(model_id)
    }

    async fn invoke(&self, request: Value) -> Result<Value, GatewayError> {
        let audio_b64 = request["file_base64"]
            .as_str()
            .ok_or_else(|| GatewayError::InvalidRequest("`file_base64` is required".to_string()))?;
        let audio_bytes = crate::media::codec::decode_base64(audio_b64).map_err(|e| GatewayError::Internal(e.to_string()))?;
        let response_format = request["response_format"].as_str().unwrap_or("json").to_string();
        let request_id = request["request_id"].as_str().unwrap_or("translation").to_string();

        let subtitle_format = if super::transcription::is_subtitle_format(&response_format) { Some(response_format.as_str()) } else { None };
        let (data, subtitle, cleanup) = self.transcription.run_job(audio_bytes, &request_id, None, subtitle_format).await?;
        let source_language = request["detected_language_code"].as_str().unwrap_or("en").to_string();

        let result = if let Some(content) = subtitle {
            let translated = translate_subtitle_content(&self.translator, &content, &source_language).await?;
            json!({ "content_type": subtitle_content_type(&response_format), "body": translated })
        } else {
            let text = translate_text_to_english(&self.translator, &transcript_text(&data), &source_language).await?;
            build_translation_response(&data, &text, &response_format)
        };

        crate::jobs::run_cleanup(cleanup, &self.transcription.object_store, &self.transcription.invoke_backend).await;
        Ok(result)
    }
}

fn subtitle_content_type(format: &str) -> &'static str {
    if format == "vtt" { "text/vtt" } else { "application/x-subrip" }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTranslator;
    #[async_trait]
    impl TextTranslator for EchoTranslator {
        async fn translate(&self, text: &str, _source: &str, _target: &str) -> Result<String, GatewayError> {
            Ok(text.replace("Hola", "Hello"))
        }
    }

    #[tokio::test]
    async fn english_source_skips_translation_call() {
        struct PanicTranslator;
        #[async_trait]
        impl TextTranslator for PanicTranslator {
            async fn translate(&self, _t: &str, _s: &str, _tg: &str) -> Result<String, GatewayError> {
                panic!("should not be called for english source")
            }
        }
        let result = translate_text_to_english(&PanicTranslator, "already english", "en-US").await.unwrap();
        assert_eq!(result, "already english");
    }

    #[tokio::test]
    async fn blank_text_skips_translation_call() {
        struct PanicTranslator;
        #[async_trait]
        impl TextTranslator for PanicTranslator {
            async fn translate(&self, _t: &str, _s: &str, _tg: &str) -> Result<String, GatewayError> {
                panic!("should not be called for blank text")
            }
        }
        let result = translate_text_to_english(&PanicTranslator, "   ", "es-US").await.unwrap();
        assert_eq!(result, "   ");
    }

    #[tokio::test]
    async fn non_english_source_is_translated() {
        let result = translate_text_to_english(&EchoTranslator, "Hola mundo", "es-US").await.unwrap();
        assert_eq!(result, "Hello mundo");
    }

    #[test]
    fn extracts_segments_from_srt_skipping_numbers_and_timing() {
        let srt = "1\n00:00:00,000 --> 00:00:02,000\nHola\n\n2\n00:00:02,000 --> 00:00:04,000\nmundo\n";
        let segments = extract_subtitle_text_segments(srt);
        assert_eq!(segments, vec!["Hola".to_string(), "mundo".to_string()]);
    }

    #[test]
    fn extracts_segments_from_vtt_skipping_header() {
        let vtt = "WEBVTT\n\n1\n00:00:00.000 --> 00:00:02.000\nHola mundo\n";
        let segments = extract_subtitle_text_segments(vtt);
        assert_eq!(segments, vec!["Hola mundo".to_string()]);
    }

    #[test]
    fn html_round_trip_preserves_segment_order() {
        let segments = vec!["Hola".to_string(), "mundo & amigos".to_string()];
        let html = create_html_for_translation(&segments);
        assert!(html.contains("id=\"seg0\""));
        assert!(html.contains("mundo &amp; amigos"));

        let parsed = parse_translated_html(&html, 2).unwrap();
        assert_eq!(parsed, vec!["Hola".to_string(), "mundo & amigos".to_string()]);
    }

    #[test]
    fn reconstruct_splices_translated_text_preserving_timing() {
        let original = "1\n00:00:00,000 --> 00:00:02,000\nHola\n\n2\n00:00:02,000 --> 00:00:04,000\nmundo\n";
        let text_segments = vec!["Hola".to_string(), "mundo".to_string()];
        let translated_segments = vec!["Hello".to_string(), "world".to_string()];
        let reconstructed = reconstruct_subtitle_with_translation(original, &text_segments, &translated_segments);
        assert!(reconstructed.contains("Hello"));
        assert!(reconstructed.contains("world"));
        assert!(reconstructed.contains("00:00:00,000 --> 00:00:02,000"));
    }

    #[tokio::test]
    async fn subtitle_content_with_no_text_segments_is_returned_unchanged() {
        let content = "WEBVTT\n\n";
        let result = translate_subtitle_content(&EchoTranslator, content, "es-US").await.unwrap();
        assert_eq!(result, content);
    }

    #[tokio::test]
    async fn full_subtitle_round_trip_translates_each_segment() {
        let srt = "1\n00:00:00,000 --> 00:00:02,000\nHola\n\n2\n00:00:02,000 --> 00:00:04,000\nmundo\n";
        let result = translate_subtitle_content(&EchoTranslator, srt, "es-US").await.unwrap();
        assert!(result.contains("Hello"));
        assert!(result.contains("00:00:02,000 --> 00:00:04,000"));
    }
}
