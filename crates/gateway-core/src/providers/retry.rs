//! Adaptive retry helper for [`super::HttpInferenceClient`]: exponential
//! backoff, up to `max_attempts` tries, only for errors the provider itself
//! signals as transient (spec.md §4.2 — "adaptive retry with up to 10
//! attempts").

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tokio_stream::wrappers::ReceiverStream;

use super::error::ProviderError;

pub async fn with_retries<F, Fut>(max_attempts: u32, mut attempt: F) -> Result<Value, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Value, ProviderError>>,
{
    let mut last_err = None;
    for attempt_number in 0..max_attempts.max(1) {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt_number + 1 < max_attempts => {
                let backoff = Duration::from_millis(50 * 2u64.pow(attempt_number.min(6)));
                tokio::time::sleep(backoff).await;
                last_err = Some(err);
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_err.unwrap_or(ProviderError::Transport("retry loop exited unexpectedly".into())))
}

pub async fn response_to_value(response: reqwest::Response) -> Result<Value, ProviderError> {
    let status = response.status();
    let body = response.text().await.map_err(ProviderError::from_transport)?;
    if !status.is_success() {
        if let Ok(parsed) = serde_json::from_str::<Value>(&body) {
            if let Some(code) = parsed.get("__type").or_else(|| parsed.get("code")).and_then(|v| v.as_str()) {
                let message = parsed
                    .get("message")
                    .and_then(|v| v.as_str())
                    .unwrap_or(&body)
                    .to_string();
                return Err(ProviderError::Provider {
                    code: code.to_string(),
                    message,
                });
            }
        }
        return Err(ProviderError::HttpStatus {
            status: status.as_u16(),
            body,
        });
    }
    serde_json::from_str(&body).map_err(|e| ProviderError::MalformedResponse(e.to_string()))
}

/// Splits a newline-delimited JSON event stream body into a channel of
/// parsed [`Value`]s, the shape adapters consume for converse streaming
/// events.
pub async fn stream_lines_as_json(
    response: reqwest::Response,
) -> Result<ReceiverStream<Result<Value, ProviderError>>, ProviderError> {
    use futures_util::StreamExt;

    let (tx, rx) = tokio::sync::mpsc::channel(32);
    let mut byte_stream = response.bytes_stream();

    tokio::spawn(async move {
        let mut buffer = Vec::new();
        while let Some(chunk) = byte_stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    let _ = tx.send(Err(ProviderError::from_transport(e))).await;
                    return;
                }
            };
            buffer.extend_from_slice(&chunk);
            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                let line = &line[..line.len() - 1];
                if line.is_empty() {
                    continue;
                }
                let parsed = serde_json::from_slice::<Value>(line)
                    .map_err(|e| ProviderError::MalformedResponse(e.to_string()));
                if tx.send(parsed).await.is_err() {
                    return;
                }
            }
        }
    });

    Ok(ReceiverStream::new(rx))
}
