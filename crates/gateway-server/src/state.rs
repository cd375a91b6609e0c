//! Process-wide application state, built once at startup and cloned
//! cheaply (every field is an `Arc`) into each request, mirroring the
//! teacher's `HandlerState<B, S>` — minus the generic backend parameters,
//! since every trait seam here is already type-erased behind `Arc<dyn _>`.

use std::sync::Arc;
use std::time::Instant;

use gateway_core::catalog::CatalogSource;
use gateway_core::credentials::{CredentialStore, SecretResolver};
use gateway_core::translate::media_blocks::MediaResolver;
use gateway_core::translate::AdapterRegistry;
use gateway_core::{GatewayConfig, ModelCatalog};

/// Everything a route handler needs to serve a request. Held behind an
/// `Arc` by axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub credentials: Arc<CredentialStore>,
    pub catalog: Arc<ModelCatalog>,
    pub catalog_source: Arc<dyn CatalogSource>,
    pub adapters: Arc<AdapterRegistry>,
    pub chat_backend: Arc<dyn gateway_core::providers::InferenceBackend>,
    pub media_resolver: Arc<MediaResolver>,
    pub started_at: Instant,
    pub mock: bool,
    pub server_id: Arc<str>,
    pub server_version: Arc<str>,
}

impl AppState {
    /// Resolves the configured API key source and hashes it, per
    /// [`CredentialStore::initialize`]; the rest of the state is supplied
    /// by the caller since it depends on which concrete backends
    /// (`HttpInferenceClient` or the `mock` feature's stubs) `main` wired
    /// up for this process.
    pub async fn new(
        config: GatewayConfig,
        resolver: &dyn SecretResolver,
        catalog: ModelCatalog,
        catalog_source: Arc<dyn CatalogSource>,
        adapters: AdapterRegistry,
        chat_backend: Arc<dyn gateway_core::providers::InferenceBackend>,
        mock: bool,
        server_id: impl Into<Arc<str>>,
        server_version: impl Into<Arc<str>>,
    ) -> Result<Self, gateway_core::credentials::CredentialError> {
        let credentials = CredentialStore::initialize(&config.api_key_source, resolver).await?;
        let media_resolver = MediaResolver {
            client: reqwest::Client::new(),
            block_private_networks: config.ssrf_protection_block_private_networks,
        };

        Ok(Self {
            config: Arc::new(config),
            credentials: Arc::new(credentials),
            catalog: Arc::new(catalog),
            catalog_source,
            adapters: Arc::new(adapters),
            chat_backend,
            media_resolver: Arc::new(media_resolver),
            started_at: Instant::now(),
            mock,
            server_id: server_id.into(),
            server_version: server_version.into(),
        })
    }
}
