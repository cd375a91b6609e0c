//! `reqwest`-backed [`CatalogSource`], the catalog-refresh counterpart to
//! [`crate::providers::HttpInferenceClient`]: fixes only the shape this
//! crate depends on against a configurable base URL, leaving the concrete
//! provider SDK call an external collaborator (spec.md §1).

use std::collections::HashSet;

use async_trait::async_trait;
use serde::Deserialize;

use crate::providers::ProviderError;

use super::{AvailabilityCheck, CatalogSource, FoundationModelInfo, InferenceProfileInfo, ProfileScope};

#[derive(Clone)]
pub struct HttpCatalogSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCatalogSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into() }
    }
}

#[derive(Deserialize)]
struct WireFoundationModel {
    id: String,
    name: String,
    provider: String,
    input_modalities: Vec<String>,
    output_modalities: Vec<String>,
    response_streaming: bool,
    #[serde(default)]
    legacy: bool,
    #[serde(default = "default_true")]
    on_demand_supported: bool,
    #[serde(default)]
    inference_profile_supported: bool,
    #[serde(default)]
    provisioned_supported: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
struct WireInferenceProfile {
    id: String,
    base_model_id: String,
    #[serde(default)]
    global: bool,
}

#[derive(Deserialize)]
struct WireAvailability {
    available: bool,
    #[serde(default)]
    reason: Option<String>,
}

fn transport_error(err: reqwest::Error) -> ProviderError {
    ProviderError::Transport(err.to_string())
}

async fn get_json<T: serde::de::DeserializeOwned>(client: &reqwest::Client, url: &str) -> Result<T, ProviderError> {
    let response = client.get(url).send().await.map_err(transport_error)?;
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::HttpStatus { status, body });
    }
    response.json::<T>().await.map_err(|e| ProviderError::MalformedResponse(e.to_string()))
}

#[async_trait]
impl CatalogSource for HttpCatalogSource {
    async fn list_foundation_models(&self, region: &str) -> Result<Vec<FoundationModelInfo>, ProviderError> {
        let url = format!("{}/foundation-models?region={region}", self.base_url);
        let models: Vec<WireFoundationModel> = get_json(&self.client, &url).await?;
        Ok(models
            .into_iter()
            .map(|m| FoundationModelInfo {
                id: m.id,
                name: m.name,
                provider: m.provider,
                input_modalities: m.input_modalities,
                output_modalities: m.output_modalities,
                response_streaming: m.response_streaming,
                legacy: m.legacy,
                on_demand_supported: m.on_demand_supported,
                inference_profile_supported: m.inference_profile_supported,
                provisioned_supported: m.provisioned_supported,
            })
            .collect())
    }

    async fn list_provisioned_models(&self, region: &str) -> Result<HashSet<String>, ProviderError> {
        let url = format!("{}/provisioned-models?region={region}", self.base_url);
        let ids: Vec<String> = get_json(&self.client, &url).await?;
        Ok(ids.into_iter().collect())
    }

    async fn list_inference_profiles(&self, region: &str) -> Result<Vec<InferenceProfileInfo>, ProviderError> {
        let url = format!("{}/inference-profiles?region={region}", self.base_url);
        let profiles: Vec<WireInferenceProfile> = get_json(&self.client, &url).await?;
        Ok(profiles
            .into_iter()
            .map(|p| InferenceProfileInfo {
                id: p.id,
                base_model_id: p.base_model_id,
                scope: if p.global { ProfileScope::Global } else { ProfileScope::Regional },
            })
            .collect())
    }

    async fn check_availability(&self, region: &str, model_id: &str) -> Result<AvailabilityCheck, ProviderError> {
        let url = format!("{}/foundation-models/{model_id}/availability?region={region}", self.base_url);
        let result: WireAvailability = get_json(&self.client, &url).await?;
        Ok(AvailabilityCheck { available: result.available, reason: result.reason })
    }
}
