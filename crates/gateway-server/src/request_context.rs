//! Builds a [`RequestContext`] at ingress and decorates every response
//! with the headers spec.md §6 calls for (`x-request-id`,
//! `openai-processing-ms`, `openai-version`, `server`, an
//! `openai-organization` echo). The context itself is handed to handlers
//! explicitly via `Extension`, per [`gateway_core::context`]'s "never via
//! task-locals" design note — this is the one place it is built, not
//! threaded implicitly.

use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;

use gateway_core::context::{GuardrailRef, RequestContext};

use crate::state::AppState;

fn header_str<'a>(request: &'a Request, name: &str) -> Option<&'a str> {
    request.headers().get(name).and_then(|v| v.to_str().ok())
}

fn client_ip(request: &Request, trust_proxy_headers: bool) -> Option<String> {
    if !trust_proxy_headers {
        return None;
    }
    header_str(request, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .or_else(|| header_str(request, "x-real-ip"))
        .map(str::to_string)
}

fn guardrail_from_headers(request: &Request, state: &AppState) -> Option<GuardrailRef> {
    let identifier = header_str(request, "x-amzn-bedrock-guardrailidentifier")
        .map(str::to_string)
        .or_else(|| state.config.aws_bedrock_guardrail.identifier.clone())?;
    let version = header_str(request, "x-amzn-bedrock-guardrailversion")
        .map(str::to_string)
        .or_else(|| state.config.aws_bedrock_guardrail.version.clone())
        .unwrap_or_else(|| "DRAFT".to_string());
    let trace = header_str(request, "x-amzn-bedrock-guardrailtrace")
        .map(str::to_string)
        .or_else(|| state.config.aws_bedrock_guardrail.trace.clone());
    Some(GuardrailRef { identifier, version, trace })
}

pub async fn attach_request_context(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let organization = header_str(&request, "openai-organization").map(str::to_string);

    let ctx = RequestContext::new()
        .with_client_ip(client_ip(&request, state.config.enable_proxy_headers))
        .with_guardrail(guardrail_from_headers(&request, &state));

    let request_id = ctx.request_id.clone();
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        headers.insert("x-request-id", value);
    }
    headers.insert("openai-processing-ms", HeaderValue::from(ctx.elapsed_ms().max(0) as u64));
    headers.insert("openai-version", HeaderValue::from_static("2020-10-01"));
    headers.insert("server", HeaderValue::from_static("gateway"));
    if let Some(organization) = organization {
        if let Ok(value) = HeaderValue::from_str(&organization) {
            headers.insert("openai-organization", value);
        }
    }

    response
}
