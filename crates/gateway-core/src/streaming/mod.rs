//! SSE, chunked-binary, and transcoder-pipe plumbing (C11), per spec.md
//! §4.7. Transport-agnostic: this crate yields byte/frame streams, and
//! `gateway-server` wraps them in `axum::response::sse::Sse` or a chunked
//! `Body`, mirroring `gateway/streaming.rs`'s split between stream
//! construction here and response-type wiring at the HTTP edge.

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};

use crate::errors::GatewayError;
use crate::media::transcode::{self, PcmInputSpec};

/// The OpenAI SSE terminal sentinel, emitted only for Chat Completions
/// (spec.md §4.7).
pub const DONE_FRAME: &str = "[DONE]";

/// Formats one SSE frame: `data: <json>\n\n`.
pub fn format_frame(payload: &Value) -> String {
    format!("data: {}\n\n", payload)
}

/// Formats the terminal `data: [DONE]\n\n` frame.
pub fn format_done_frame() -> String {
    format!("data: {DONE_FRAME}\n\n")
}

/// Wraps a stream of JSON payloads into SSE frames, appending the
/// `[DONE]` sentinel when `emit_done` is set (Chat Completions only; every
/// other streaming endpoint omits it, per spec.md §4.7).
pub fn sse_frames<S>(source: S, emit_done: bool) -> impl Stream<Item = Result<String, GatewayError>> + Send
where
    S: Stream<Item = Result<Value, GatewayError>> + Send + 'static,
{
    let body = source.map(|item| item.map(|payload| format_frame(&payload)));
    let done = futures_util::stream::once(async move { Ok(format_done_frame()) });
    if emit_done {
        futures_util::stream::StreamExt::boxed(body.chain(done))
    } else {
        futures_util::stream::StreamExt::boxed(body)
    }
}

const AUDIO_CHUNK_SIZE: usize = 65536;

/// Splits a fully-buffered audio payload into provider-sized (64 KiB)
/// chunks for the non-streaming binary response path, per spec.md §4.7.
pub fn chunk_bytes(bytes: &[u8]) -> Vec<Vec<u8>> {
    if bytes.is_empty() {
        return Vec::new();
    }
    bytes.chunks(AUDIO_CHUNK_SIZE).map(|chunk| chunk.to_vec()).collect()
}

/// Feeds a fully-buffered input through the external transcoder and
/// streams its output in 64-KiB blocks, reusing
/// [`crate::media::transcode::encode_audio_stream`]; a missing transcoder
/// binary surfaces as [`GatewayError::ProviderUnavailable`] per spec.md
/// §4.7's "advising administrator action".
pub async fn transcoder_pipe(
    input: Vec<u8>,
    output_format: &str,
    input_format: Option<&str>,
    pcm_spec: Option<PcmInputSpec>,
) -> Result<ReceiverStream<Result<Vec<u8>, GatewayError>>, GatewayError> {
    let stream = transcode::encode_audio_stream(input, output_format, input_format, pcm_spec)
        .await
        .map_err(map_transcode_error)?;

    let (tx, rx) = mpsc::channel(8);
    tokio::spawn(async move {
        tokio::pin!(stream);
        while let Some(chunk) = stream.next().await {
            let mapped = chunk.map_err(map_transcode_error);
            if tx.send(mapped).await.is_err() {
                break;
            }
        }
    });
    Ok(ReceiverStream::new(rx))
}

fn map_transcode_error(err: crate::media::MediaError) -> GatewayError {
    match err {
        crate::media::MediaError::TranscoderUnavailable => GatewayError::ProviderUnavailable {
            message: "the audio transcoder is not available; contact your administrator".to_string(),
            code: Some("transcoder_unavailable".to_string()),
        },
        other => GatewayError::Internal(other.to_string()),
    }
}

/// Collects a byte stream into a single buffer, for callers that need the
/// whole payload before responding (e.g. binary TTS responses that still
/// require a `Content-Length`).
pub async fn collect_bytes<S>(mut stream: S) -> Result<Vec<u8>, GatewayError>
where
    S: Stream<Item = Result<Vec<u8>, GatewayError>> + Unpin,
{
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn frame_wraps_payload_in_data_prefix_and_blank_line() {
        let frame = format_frame(&json!({"a": 1}));
        assert_eq!(frame, "data: {\"a\":1}\n\n");
    }

    #[test]
    fn done_frame_is_the_openai_sentinel() {
        assert_eq!(format_done_frame(), "data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn sse_frames_appends_done_when_requested() {
        let source = futures_util::stream::iter(vec![Ok(json!({"i": 0})), Ok(json!({"i": 1}))]);
        let frames: Vec<_> = sse_frames(source, true).collect().await;
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2].as_ref().unwrap(), "data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn sse_frames_omits_done_for_non_chat_endpoints() {
        let source = futures_util::stream::iter(vec![Ok(json!({"i": 0}))]);
        let frames: Vec<_> = sse_frames(source, false).collect().await;
        assert_eq!(frames.len(), 1);
    }

    #[tokio::test]
    async fn sse_frames_propagates_errors() {
        let source = futures_util::stream::iter(vec![Err(GatewayError::Internal("boom".to_string()))]);
        let frames: Vec<_> = sse_frames(source, true).collect().await;
        assert!(frames[0].is_err());
    }

    #[test]
    fn chunk_bytes_splits_into_64kib_blocks() {
        let bytes = vec![0u8; 150_000];
        let chunks = chunk_bytes(&bytes);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), AUDIO_CHUNK_SIZE);
        assert_eq!(chunks[2].len(), 150_000 - 2 * AUDIO_CHUNK_SIZE);
    }

    #[test]
    fn chunk_bytes_of_empty_input_is_empty() {
        assert!(chunk_bytes(&[]).is_empty());
    }

    #[tokio::test]
    async fn transcoder_pipe_surfaces_unavailable_for_missing_binary() {
        // ffmpeg is assumed present in the deployment environment; the error
        // mapping itself is exercised against a transcode::MediaError value
        // directly to avoid depending on the host's binary layout.
        let mapped = map_transcode_error(crate::media::MediaError::TranscoderUnavailable);
        assert!(matches!(mapped, GatewayError::ProviderUnavailable { .. }));
    }

    #[tokio::test]
    async fn collect_bytes_concatenates_chunks_in_order() {
        let source = futures_util::stream::iter(vec![Ok(vec![1, 2]), Ok(vec![3, 4])]);
        let collected = collect_bytes(source).await.unwrap();
        assert_eq!(collected, vec![1, 2, 3, 4]);
    }
}
