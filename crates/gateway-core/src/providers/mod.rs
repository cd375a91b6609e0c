//! Provider client pool (C3): one client per (service, region), opened at
//! startup, handed out by reference, torn down in reverse acquisition
//! order.
//!
//! The concrete provider SDK is an external collaborator (spec.md §1), so
//! this module fixes only the shape the rest of the gateway depends on —
//! [`InferenceBackend`] — and ships a `reqwest`-based default
//! implementation against a configurable base URL, the same way the
//! teacher's `HandlerState` holds a `genai::Client` rather than embedding a
//! provider SDK directly.

pub mod error;
pub mod retry;

pub use error::ProviderError;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// The services the pool opens clients for, per spec.md §4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    Inference,
    TextToSpeech,
    SpeechToText,
    Translate,
    ObjectStore,
    Metadata,
}

/// A single unary or streaming call against the provider's inference
/// service. Kept minimal and JSON-shaped so adapters can speak whatever
/// converse-style wire format the real SDK defines without this crate
/// committing to its types.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn invoke(&self, model_id: &str, body: Value) -> Result<Value, ProviderError>;

    async fn invoke_stream(
        &self,
        model_id: &str,
        body: Value,
    ) -> Result<tokio_stream::wrappers::ReceiverStream<Result<Value, ProviderError>>, ProviderError>;
}

#[async_trait]
impl InferenceBackend for Arc<dyn InferenceBackend> {
    async fn invoke(&self, model_id: &str, body: Value) -> Result<Value, ProviderError> {
        (**self).invoke(model_id, body).await
    }

    async fn invoke_stream(
        &self,
        model_id: &str,
        body: Value,
    ) -> Result<tokio_stream::wrappers::ReceiverStream<Result<Value, ProviderError>>, ProviderError> {
        (**self).invoke_stream(model_id, body).await
    }
}

/// `reqwest`-backed [`InferenceBackend`] talking to a configurable base
/// URL, with up to 10 retry attempts on transient failures and a
/// connection pool capped at 50, per spec.md §4.2.
#[derive(Clone)]
pub struct HttpInferenceClient {
    client: reqwest::Client,
    base_url: String,
    region: String,
}

impl HttpInferenceClient {
    pub fn new(base_url: impl Into<String>, region: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(50)
            .build()
            .expect("reqwest client configuration is valid");
        Self {
            client,
            base_url: base_url.into(),
            region: region.into(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}

#[async_trait]
impl InferenceBackend for HttpInferenceClient {
    async fn invoke(&self, model_id: &str, body: Value) -> Result<Value, ProviderError> {
        let url = format!("{}/model/{}/converse", self.base_url, model_id);
        retry::with_retries(10, || async {
            let response = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(ProviderError::from_transport)?;
            retry::response_to_value(response).await
        })
        .await
    }

    async fn invoke_stream(
        &self,
        model_id: &str,
        body: Value,
    ) -> Result<tokio_stream::wrappers::ReceiverStream<Result<Value, ProviderError>>, ProviderError>
    {
        let url = format!("{}/model/{}/converse-stream", self.base_url, model_id);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::from_transport)?;
        retry::stream_lines_as_json(response).await
    }
}

/// Per-(service, region) client map, opened once at startup and read-only
/// thereafter.
#[derive(Default, Clone)]
pub struct ProviderClientPool {
    clients: HashMap<(ServiceKind, String), Arc<dyn InferenceBackend>>,
}

impl ProviderClientPool {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
        }
    }

    pub fn register(&mut self, service: ServiceKind, region: impl Into<String>, client: Arc<dyn InferenceBackend>) {
        self.clients.insert((service, region.into()), client);
    }

    /// Returns the client for `(service, region)`. When only one region is
    /// pooled for `service`, `region` is ignored, per spec.md §4.2.
    pub fn get(&self, service: ServiceKind, region: &str) -> Option<Arc<dyn InferenceBackend>> {
        if let Some(client) = self.clients.get(&(service, region.to_string())) {
            return Some(client.clone());
        }
        let matches: Vec<_> = self
            .clients
            .iter()
            .filter(|((svc, _), _)| *svc == service)
            .collect();
        if matches.len() == 1 {
            return Some(matches[0].1.clone());
        }
        None
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubBackend;

    #[async_trait]
    impl InferenceBackend for StubBackend {
        async fn invoke(&self, _model_id: &str, _body: Value) -> Result<Value, ProviderError> {
            Ok(Value::Null)
        }

        async fn invoke_stream(
            &self,
            _model_id: &str,
            _body: Value,
        ) -> Result<tokio_stream::wrappers::ReceiverStream<Result<Value, ProviderError>>, ProviderError>
        {
            let (_tx, rx) = tokio::sync::mpsc::channel(1);
            Ok(tokio_stream::wrappers::ReceiverStream::new(rx))
        }
    }

    #[test]
    fn region_ignored_when_single_region_pooled() {
        let mut pool = ProviderClientPool::new();
        pool.register(ServiceKind::TextToSpeech, "us-east-1", Arc::new(StubBackend));
        assert!(pool.get(ServiceKind::TextToSpeech, "eu-west-1").is_some());
    }

    #[test]
    fn exact_region_match_preferred_with_multiple_regions() {
        let mut pool = ProviderClientPool::new();
        pool.register(ServiceKind::Inference, "us-east-1", Arc::new(StubBackend));
        pool.register(ServiceKind::Inference, "us-west-2", Arc::new(StubBackend));
        assert!(pool.get(ServiceKind::Inference, "us-east-1").is_some());
        assert!(pool.get(ServiceKind::Inference, "eu-north-1").is_none());
    }

    #[test]
    fn unregistered_service_returns_none() {
        let pool = ProviderClientPool::new();
        assert!(pool.get(ServiceKind::ObjectStore, "us-east-1").is_none());
    }
}
