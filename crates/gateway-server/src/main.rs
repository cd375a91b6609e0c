//! Gateway process entrypoint, grounded in the teacher's `main.rs`:
//! mimalloc allocator, `--health-check` self-probe, `tracing_subscriber`
//! init, env-backed config, and graceful shutdown on Ctrl+C/SIGTERM.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mimalloc::MiMalloc;
use tokio::net::TcpListener;
use tokio::signal;

use gateway_core::catalog::{CatalogSource, HttpCatalogSource, ModelCatalog};
use gateway_core::credentials::NullSecretResolver;
use gateway_core::observability::EventLog;
use gateway_core::providers::{HttpInferenceClient, InferenceBackend};
use gateway_core::translate::embeddings::{EmbeddingsAdapter, SyncLimits};
use gateway_core::translate::images::ImagesAdapter;
use gateway_core::translate::speech::{SpeechAdapter, VoiceCatalog};
use gateway_core::translate::transcription::TranscriptionAdapter;
use gateway_core::translate::translation::{HttpTextTranslator, TranslationAdapter};
use gateway_core::translate::AdapterRegistry;
use gateway_core::{jobs, GatewayConfig};
use gateway_server::state::AppState;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Base URL for the provider's foundation-model/inference-profile/
/// availability HTTP surface, consumed by [`HttpCatalogSource`] and
/// [`HttpInferenceClient`]; `GatewayConfig` has no field for it since it
/// names an upstream collaborator rather than gateway behavior, so it is
/// read directly here, with a Bedrock-runtime-shaped default per region.
fn provider_base_url(region: &str) -> String {
    std::env::var("PROVIDER_BASE_URL").unwrap_or_else(|_| format!("https://bedrock-runtime.{region}.amazonaws.com"))
}

fn provider_control_plane_url(region: &str) -> String {
    std::env::var("PROVIDER_CONTROL_PLANE_URL").unwrap_or_else(|_| format!("https://bedrock.{region}.amazonaws.com"))
}

fn object_store_url() -> String {
    std::env::var("OBJECT_STORE_URL").unwrap_or_else(|_| "https://s3.amazonaws.com".to_string())
}

fn translate_url(region: &str) -> String {
    std::env::var("TRANSLATE_BASE_URL").unwrap_or_else(|_| format!("https://translate.{region}.amazonaws.com"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!(
        r#"
  ___                        _    ___    ____       _
 / _ \ _ __   ___ _ __      / \  |_ _|  / ___| __ _| |_ ___
| | | | '_ \ / _ \ '_ \    / _ \  | |  | |  _ / _` | __/ _ \
| |_| | |_) |  __/ | | |  / ___ \ | |  | |_| | (_| | ||  __/
 \___/| .__/ \___|_| |_| /_/   \_\___|  \____|\__,_|\__\___|
      |_|
"#
    );

    if std::env::args().any(|arg| arg == "--health-check") {
        std::process::exit(run_health_check());
    }

    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let server_id = uuid::Uuid::new_v4().to_string();
    let server_version = env!("CARGO_PKG_VERSION").to_string();

    let config = GatewayConfig::from_env()?;
    config.validate()?;
    let addr: SocketAddr = SocketAddr::from(([0, 0, 0, 0], config.bind_port));

    tracing::info!(port = config.bind_port, regions = ?config.aws_bedrock_regions, "gateway starting");
    EventLog::Start { date: chrono::Utc::now(), server_id: server_id.clone(), server_version: server_version.clone() }.emit();

    let primary_region = config.aws_bedrock_regions.first().cloned().unwrap_or_else(|| "us-east-1".to_string());

    let catalog_source: Arc<dyn CatalogSource> = Arc::new(HttpCatalogSource::new(provider_control_plane_url(&primary_region)));
    let catalog = ModelCatalog::new(
        Duration::from_secs(config.model_cache_seconds),
        config.aws_bedrock_regions.clone(),
        config.aws_bedrock_legacy,
        config.aws_bedrock_cross_region_inference,
        config.aws_bedrock_cross_region_inference_global,
    );

    tracing::info!("refreshing model catalog...");
    if let Err(e) = catalog.refresh(catalog_source.as_ref()).await {
        tracing::warn!(error = %e, "initial catalog refresh failed, starting with an empty catalog");
    }

    let chat_backend: Arc<dyn InferenceBackend> = Arc::new(HttpInferenceClient::new(provider_base_url(&primary_region), primary_region.clone()));

    let bucket = config.aws_s3_bucket.clone().unwrap_or_else(|| "gateway-async-jobs".to_string());
    let object_store = Arc::new(gateway_core::jobs::HttpObjectStore::new(object_store_url()));
    let invoke_backend = Arc::new(gateway_core::jobs::HttpAsyncInvokeBackend::new(provider_base_url(&primary_region)));
    let translator = HttpTextTranslator::new(translate_url(&primary_region));

    let mut adapters = AdapterRegistry::new();
    adapters.register(Arc::new(EmbeddingsAdapter {
        model_prefix: "amazon.nova-2-multimodal-embeddings".to_string(),
        bucket: bucket.clone(),
        limits: SyncLimits::default(),
        inference_backend: chat_backend.clone(),
        invoke_backend: invoke_backend.clone() as Arc<dyn jobs::AsyncInvokeBackend>,
        object_store: object_store.clone() as Arc<dyn jobs::ObjectStore>,
    }));
    adapters.register(Arc::new(ImagesAdapter {
        model_prefix: "amazon.nova-canvas".to_string(),
        bucket: bucket.clone(),
        inference_backend: chat_backend.clone(),
        object_store: object_store.clone() as Arc<dyn jobs::ObjectStore>,
    }));
    adapters.register(Arc::new(SpeechAdapter {
        model_prefix: "amazon.polly".to_string(),
        voice_catalog: VoiceCatalog::default(),
        inference_backend: chat_backend.clone(),
    }));
    adapters.register(Arc::new(TranscriptionAdapter {
        model_id: "amazon.transcribe".to_string(),
        bucket: bucket.clone(),
        prefix: "transcribe-jobs".to_string(),
        invoke_backend: invoke_backend.clone() as Arc<dyn jobs::AsyncInvokeBackend>,
        object_store: object_store.clone() as Arc<dyn jobs::ObjectStore>,
    }));
    adapters.register(Arc::new(TranslationAdapter {
        transcription: TranscriptionAdapter {
            model_id: "amazon.transcribe".to_string(),
            bucket: bucket.clone(),
            prefix: "translate-jobs".to_string(),
            invoke_backend: invoke_backend.clone() as Arc<dyn jobs::AsyncInvokeBackend>,
            object_store: object_store.clone() as Arc<dyn jobs::ObjectStore>,
        },
        translator,
    }));

    let state = AppState::new(
        config,
        &NullSecretResolver,
        catalog,
        catalog_source,
        adapters,
        chat_backend,
        false,
        server_id.clone(),
        server_version.clone(),
    )
    .await?;

    let app = gateway_server::routes::create_router(state);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "gateway listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    tracing::info!("gateway shutdown complete");
    EventLog::Stop { date: chrono::Utc::now(), server_id, server_version, reason: None }.emit();
    Ok(())
}

fn run_health_check() -> i32 {
    let port = std::env::var("PORT").ok().and_then(|p| p.parse::<u16>().ok()).unwrap_or(8080);
    let url = format!("http://127.0.0.1:{port}/healthz");

    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().expect("failed to build runtime");

    rt.block_on(async {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(1)).build().expect("failed to build client");
        match client.get(&url).send().await {
            Ok(res) if res.status().is_success() => 0,
            _ => 1,
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate()).expect("failed to install SIGTERM handler").recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => tracing::info!("received SIGTERM, initiating graceful shutdown"),
    }
}
