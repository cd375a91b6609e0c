//! Stub provider/storage backends for local development and integration
//! tests, behind `feature = "mock"" — the same role the teacher's
//! `MockBqClient`/`MockStorageLoader` play for its vector store.
//!
//! None of these talk to a network; they exist so the server binary and
//! its integration tests can exercise the full request path without a
//! real cloud account.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_stream::wrappers::ReceiverStream;

use crate::catalog::{AvailabilityCheck, CatalogSource, FoundationModelInfo, InferenceProfileInfo};
use crate::jobs::{AsyncInvokeBackend, AsyncInvokeStatus, JobError, ObjectStore};
use crate::providers::{InferenceBackend, ProviderError};

/// Echoes a synthetic converse response back for any model id, so the chat
/// translation pipeline can run end to end without a real inference
/// backend.
pub struct MockInferenceBackend;

#[async_trait]
impl InferenceBackend for MockInferenceBackend {
    async fn invoke(&self, _model_id: &str, body: Value) -> Result<Value, ProviderError> {
        let echoed = body["messages"]
            .as_array()
            .and_then(|m| m.last())
            .and_then(|m| m["content"].as_array())
            .and_then(|c| c.first())
            .and_then(|b| b["text"].as_str())
            .unwrap_or("mock response")
            .to_string();

        Ok(json!({
            "output": { "message": { "role": "assistant", "content": [{"text": format!("mock: {echoed}")}] } },
            "stopReason": "end_turn",
            "usage": { "inputTokens": 8, "outputTokens": 4, "totalTokens": 12 },
        }))
    }

    async fn invoke_stream(
        &self,
        model_id: &str,
        body: Value,
    ) -> Result<ReceiverStream<Result<Value, ProviderError>>, ProviderError> {
        let (tx, rx) = tokio::sync::mpsc::channel(4);
        let response = self.invoke(model_id, body).await?;
        let text = response["output"]["message"]["content"][0]["text"].as_str().unwrap_or("").to_string();
        tokio::spawn(async move {
            let _ = tx.send(Ok(json!({"messageStart": {"role": "assistant"}}))).await;
            let _ = tx
                .send(Ok(json!({"contentBlockDelta": {"contentBlockIndex": 0, "delta": {"text": text}}})))
                .await;
            let _ = tx.send(Ok(json!({"messageStop": {"stopReason": "end_turn"}}))).await;
        });
        Ok(ReceiverStream::new(rx))
    }
}

/// In-memory bucket, keyed by `(bucket, key)`. Good enough to exercise the
/// async job runtime's upload/poll/fetch/cleanup cycle in tests.
#[derive(Default)]
pub struct MockObjectStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), JobError> {
        self.objects.lock().expect("mock object store lock poisoned").insert((bucket.to_string(), key.to_string()), bytes);
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, JobError> {
        self.objects
            .lock()
            .expect("mock object store lock poisoned")
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| JobError::ObjectStore(format!("no such object s3://{bucket}/{key}")))
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), JobError> {
        self.objects.lock().expect("mock object store lock poisoned").remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn list_prefix(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, JobError> {
        let objects = self.objects.lock().expect("mock object store lock poisoned");
        Ok(objects
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(prefix))
            .map(|(_, k)| k.clone())
            .collect())
    }

    async fn presigned_url(&self, bucket: &str, key: &str, ttl_secs: u64) -> Result<String, JobError> {
        Ok(format!("https://mock-object-store.invalid/{bucket}/{key}?ttl={ttl_secs}"))
    }
}

/// Completes every async invocation immediately with an empty manifest,
/// so adapters exercising the S3 job pipeline don't block on real polling.
pub struct MockAsyncInvokeBackend;

#[async_trait]
impl AsyncInvokeBackend for MockAsyncInvokeBackend {
    async fn start_async_invoke(&self, _model_id: &str, _payload: Value, output_s3_uri: &str) -> Result<String, JobError> {
        Ok(format!("mock-arn:{output_s3_uri}"))
    }

    async fn get_async_invoke(&self, invocation_arn: &str) -> Result<AsyncInvokeStatus, JobError> {
        let output_s3_uri = invocation_arn.strip_prefix("mock-arn:").unwrap_or(invocation_arn).to_string();
        Ok(AsyncInvokeStatus::Completed { output_s3_uri })
    }

    async fn stop_async_invoke(&self, _invocation_arn: &str) -> Result<(), JobError> {
        Ok(())
    }
}

/// Serves a small static catalog (one text model, always available) so the
/// model-listing routes and `/healthz`/`/ready` have something to report.
pub struct MockCatalogSource;

#[async_trait]
impl CatalogSource for MockCatalogSource {
    async fn list_foundation_models(&self, _region: &str) -> Result<Vec<FoundationModelInfo>, ProviderError> {
        Ok(vec![FoundationModelInfo {
            id: "anthropic.claude-3-5-sonnet".to_string(),
            name: "Claude 3.5 Sonnet (mock)".to_string(),
            provider: "anthropic".to_string(),
            input_modalities: vec!["TEXT".to_string(), "IMAGE".to_string()],
            output_modalities: vec!["TEXT".to_string()],
            response_streaming: true,
            legacy: false,
            on_demand_supported: true,
            inference_profile_supported: false,
            provisioned_supported: false,
        }])
    }

    async fn list_provisioned_models(&self, _region: &str) -> Result<std::collections::HashSet<String>, ProviderError> {
        Ok(std::collections::HashSet::new())
    }

    async fn list_inference_profiles(&self, _region: &str) -> Result<Vec<InferenceProfileInfo>, ProviderError> {
        Ok(Vec::new())
    }

    async fn check_availability(&self, _region: &str, _model_id: &str) -> Result<AvailabilityCheck, ProviderError> {
        Ok(AvailabilityCheck { available: true, reason: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inference_backend_echoes_last_user_message() {
        let body = json!({"messages": [{"role": "user", "content": [{"text": "hi there"}]}]});
        let response = MockInferenceBackend.invoke("any-model", body).await.unwrap();
        assert_eq!(response["output"]["message"]["content"][0]["text"], "mock: hi there");
    }

    #[tokio::test]
    async fn object_store_round_trips_put_get_delete() {
        let store = MockObjectStore::new();
        store.put("bucket", "key", vec![1, 2, 3]).await.unwrap();
        assert_eq!(store.get("bucket", "key").await.unwrap(), vec![1, 2, 3]);
        store.delete("bucket", "key").await.unwrap();
        assert!(store.get("bucket", "key").await.is_err());
    }

    #[tokio::test]
    async fn async_invoke_completes_immediately() {
        let backend = MockAsyncInvokeBackend;
        let arn = backend.start_async_invoke("model", json!({}), "s3://bucket/job").await.unwrap();
        let status = backend.get_async_invoke(&arn).await.unwrap();
        assert!(matches!(status, AsyncInvokeStatus::Completed { .. }));
    }

    #[tokio::test]
    async fn catalog_source_lists_one_available_model() {
        let models = MockCatalogSource.list_foundation_models("us-east-1").await.unwrap();
        assert_eq!(models.len(), 1);
        let availability = MockCatalogSource.check_availability("us-east-1", &models[0].id).await.unwrap();
        assert!(availability.available);
    }
}
