//! Plugin registry shared by every modality adapter (spec.md §4.5): each
//! adapter claims a prefix or regex over model ids; the dispatcher resolves
//! `model_id` against the registry once and caches the binding.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_stream::wrappers::ReceiverStream;

use crate::errors::GatewayError;

#[async_trait]
pub trait Adapter: Send + Sync {
    /// `true` if this adapter handles `model_id` (prefix or regex match).
    fn matches(&self, model_id: &str) -> bool;

    async fn invoke(&self, request: Value) -> Result<Value, GatewayError>;

    /// Streaming path; adapters without one return `UnsupportedParameter`.
    async fn invoke_stream(&self, _request: Value) -> Result<ReceiverStream<Result<Value, GatewayError>>, GatewayError> {
        Err(GatewayError::UnsupportedParameter { param: "stream".to_string() })
    }

    /// Async-job-runtime path (spec.md §4.6); adapters without one return
    /// `UnsupportedParameter`.
    async fn invoke_async(&self, _request: Value) -> Result<Value, GatewayError> {
        Err(GatewayError::UnsupportedParameter { param: "async".to_string() })
    }
}

/// Resolves `model_id → adapter` on first use and caches the binding, per
/// spec.md §4.5.
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn Adapter>>,
    cache: Mutex<HashMap<String, Arc<dyn Adapter>>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self { adapters: Vec::new(), cache: Mutex::new(HashMap::new()) }
    }

    pub fn register(&mut self, adapter: Arc<dyn Adapter>) {
        self.adapters.push(adapter);
    }

    pub async fn resolve(&self, model_id: &str) -> Option<Arc<dyn Adapter>> {
        {
            let cache = self.cache.lock().await;
            if let Some(adapter) = cache.get(model_id) {
                return Some(adapter.clone());
            }
        }

        let adapter = self.adapters.iter().find(|a| a.matches(model_id))?.clone();
        self.cache.lock().await.insert(model_id.to_string(), adapter.clone());
        Some(adapter)
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PrefixAdapter(&'static str);

    #[async_trait]
    impl Adapter for PrefixAdapter {
        fn matches(&self, model_id: &str) -> bool {
            model_id.starts_with(self.0)
        }

        async fn invoke(&self, _request: Value) -> Result<Value, GatewayError> {
            Ok(Value::String(self.0.to_string()))
        }
    }

    #[tokio::test]
    async fn resolves_by_prefix_and_caches() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(PrefixAdapter("anthropic.")));
        registry.register(Arc::new(PrefixAdapter("amazon.")));

        let adapter = registry.resolve("anthropic.claude-3-5-sonnet").await.unwrap();
        let result = adapter.invoke(Value::Null).await.unwrap();
        assert_eq!(result, Value::String("anthropic.".to_string()));

        assert!(registry.resolve("unregistered.model").await.is_none());
    }

    #[tokio::test]
    async fn default_invoke_stream_is_unsupported() {
        let adapter = PrefixAdapter("x.");
        let result = adapter.invoke_stream(Value::Null).await;
        assert!(matches!(result, Err(GatewayError::UnsupportedParameter { .. })));
    }
}
