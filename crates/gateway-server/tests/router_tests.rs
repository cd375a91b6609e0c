//! Full-router integration tests, grounded in the teacher's
//! `gateway::handler_tests` style: build a real `Router` over the `mock`
//! feature's backends and drive it with `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use gateway_core::catalog::{CatalogSource, ModelCatalog};
use gateway_core::config::ApiKeySource;
use gateway_core::credentials::NullSecretResolver;
use gateway_core::mock::{MockCatalogSource, MockInferenceBackend};
use gateway_core::providers::InferenceBackend;
use gateway_core::translate::AdapterRegistry;
use gateway_core::GatewayConfig;
use gateway_server::state::AppState;

async fn build_state(api_key_source: ApiKeySource) -> AppState {
    let config = GatewayConfig { api_key_source, ..GatewayConfig::default() };

    let catalog_source: Arc<dyn CatalogSource> = Arc::new(MockCatalogSource);
    let catalog = ModelCatalog::new(
        std::time::Duration::from_secs(config.model_cache_seconds),
        config.aws_bedrock_regions.clone(),
        config.aws_bedrock_legacy,
        config.aws_bedrock_cross_region_inference,
        config.aws_bedrock_cross_region_inference_global,
    );
    catalog.refresh(catalog_source.as_ref()).await.expect("mock catalog refresh never fails");

    let chat_backend: Arc<dyn InferenceBackend> = Arc::new(MockInferenceBackend);
    let adapters = AdapterRegistry::new();

    AppState::new(
        config,
        &NullSecretResolver,
        catalog,
        catalog_source,
        adapters,
        chat_backend,
        true,
        "test-server",
        "0.0.0-test",
    )
    .await
    .expect("credential store initializes from a mock config")
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn healthz_is_always_ok() {
    let state = build_state(ApiKeySource::None).await;
    let app = gateway_server::routes::create_router(state);

    let response = app.oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn ready_reports_hydrated_catalog() {
    let state = build_state(ApiKeySource::None).await;
    let app = gateway_server::routes::create_router(state);

    let response = app.oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["components"]["catalog_hydrated"], true);
}

#[tokio::test]
async fn chat_completions_requires_bearer_token_when_configured() {
    let state = build_state(ApiKeySource::Inline("sk-test-key".to_string())).await;
    let app = gateway_server::routes::create_router(state);

    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({
                "model": "anthropic.claude-3-5-sonnet",
                "messages": [{"role": "user", "content": "hi"}],
            })
            .to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn chat_completions_echoes_mock_backend_response() {
    let state = build_state(ApiKeySource::None).await;
    let app = gateway_server::routes::create_router(state);

    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({
                "model": "anthropic.claude-3-5-sonnet",
                "messages": [{"role": "user", "content": "hi there"}],
            })
            .to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = body_json(response).await;
    eprintln!("DEBUG STATUS {status} BODY {body}");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["choices"][0]["message"]["content"], "mock: hi there");
}

#[tokio::test]
async fn chat_completions_rejects_unknown_model() {
    let state = build_state(ApiKeySource::None).await;
    let app = gateway_server::routes::create_router(state);

    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({
                "model": "no-such-model",
                "messages": [{"role": "user", "content": "hi"}],
            })
            .to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn chat_completions_rejects_n_greater_than_one_with_streaming() {
    let state = build_state(ApiKeySource::None).await;
    let app = gateway_server::routes::create_router(state);

    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({
                "model": "anthropic.claude-3-5-sonnet",
                "messages": [{"role": "user", "content": "hi"}],
                "n": 2,
                "stream": true,
            })
            .to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_models_returns_openai_shaped_list() {
    let state = build_state(ApiKeySource::None).await;
    let app = gateway_server::routes::create_router(state);

    let response = app.oneshot(Request::builder().uri("/v1/models").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["object"], "list");
    assert_eq!(body["data"][0]["id"], "anthropic.claude-3-5-sonnet");
}

#[tokio::test]
async fn get_unknown_model_returns_404() {
    let state = build_state(ApiKeySource::None).await;
    let app = gateway_server::routes::create_router(state);

    let response =
        app.oneshot(Request::builder().uri("/v1/models/no-such-model").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
