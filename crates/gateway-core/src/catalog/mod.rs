//! Model catalog (C4): lazily refreshed, multi-region, fan-out index of
//! available models, per spec.md §4.3.

pub mod deprecation;
pub mod error;
pub mod http_source;
pub mod metering;


pub use error::CatalogError;
pub use http_source::HttpCatalogSource;
pub use metering::{MeteringHandshake, NoopMeteringHandshake};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::providers::ProviderError;

/// Whether an inference profile spans every region or just one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileScope {
    Global,
    Regional,
}

/// Identity and routing metadata for one model, created during catalog
/// refresh and immutable once indexed (spec.md §3).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ModelDescriptor {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub region: String,
    pub service: String,
    pub input_modalities: Vec<String>,
    pub output_modalities: Vec<String>,
    pub response_streaming: bool,
    pub legacy: bool,
    pub inference_profile_id: Option<String>,
}

impl ModelDescriptor {
    /// `inference_profile_id` when set and cross-region inference is
    /// enabled, otherwise `id`.
    pub fn effective_id(&self, cross_region_inference_enabled: bool) -> &str {
        if cross_region_inference_enabled {
            self.inference_profile_id.as_deref().unwrap_or(&self.id)
        } else {
            &self.id
        }
    }

    fn supports_input(&self, modality: &str) -> bool {
        let modality = modality.to_uppercase();
        self.input_modalities.iter().any(|m| m.to_uppercase() == modality)
    }

    fn supports_output(&self, modality: &str) -> bool {
        let modality = modality.to_uppercase();
        self.output_modalities.iter().any(|m| m.to_uppercase() == modality)
    }
}

/// Raw foundation-model listing entry from the provider, before
/// availability filtering.
#[derive(Debug, Clone)]
pub struct FoundationModelInfo {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub input_modalities: Vec<String>,
    pub output_modalities: Vec<String>,
    pub response_streaming: bool,
    pub legacy: bool,
    pub on_demand_supported: bool,
    pub inference_profile_supported: bool,
    pub provisioned_supported: bool,
}

/// A cross-region inference profile as reported by the provider.
#[derive(Debug, Clone)]
pub struct InferenceProfileInfo {
    pub id: String,
    pub base_model_id: String,
    pub scope: ProfileScope,
}

/// Per-model authorization/entitlement/region-availability/marketplace
/// result from step 5 of the refresh algorithm.
#[derive(Debug, Clone)]
pub struct AvailabilityCheck {
    pub available: bool,
    pub reason: Option<String>,
}

/// The three provider calls fanned out per region plus the per-candidate
/// availability check (spec.md §4.3 steps 3 and 5). The provider SDK is an
/// external collaborator; this trait fixes only the shape the refresh
/// algorithm consumes.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn list_foundation_models(&self, region: &str) -> Result<Vec<FoundationModelInfo>, ProviderError>;
    async fn list_provisioned_models(&self, region: &str) -> Result<HashSet<String>, ProviderError>;
    async fn list_inference_profiles(&self, region: &str) -> Result<Vec<InferenceProfileInfo>, ProviderError>;
    async fn check_availability(&self, region: &str, model_id: &str) -> Result<AvailabilityCheck, ProviderError>;
}

/// Immutable point-in-time view the catalog hands out to readers.
#[derive(Default, Clone)]
struct Snapshot {
    foundation: HashMap<String, ModelDescriptor>,
    extra: HashMap<String, ModelDescriptor>,
    all: HashMap<String, ModelDescriptor>,
    input_modality_index: HashMap<String, HashSet<String>>,
    output_modality_index: HashMap<String, HashSet<String>>,
    unavailability: HashMap<String, String>,
}

impl Snapshot {
    fn rebuild_unified(&mut self) {
        self.all = self.foundation.clone();
        self.all.extend(self.extra.clone());
    }

    fn rebuild_modality_indexes(&mut self) {
        let mut input_index: HashMap<String, HashSet<String>> = HashMap::new();
        let mut output_index: HashMap<String, HashSet<String>> = HashMap::new();
        for descriptor in self.all.values() {
            for modality in &descriptor.input_modalities {
                input_index
                    .entry(modality.to_uppercase())
                    .or_default()
                    .insert(descriptor.id.clone());
            }
            for modality in &descriptor.output_modalities {
                output_index
                    .entry(modality.to_uppercase())
                    .or_default()
                    .insert(descriptor.id.clone());
            }
        }
        self.input_modality_index = input_index;
        self.output_modality_index = output_index;
    }
}

/// Multi-region, TTL-gated, single-flight model index (spec.md §3/§4.3).
pub struct ModelCatalog {
    snapshot: RwLock<Arc<Snapshot>>,
    refresh_lock: Mutex<()>,
    next_refresh_after: RwLock<Option<Instant>>,
    ttl: Duration,
    regions: Vec<String>,
    include_legacy: bool,
    cross_region_inference: bool,
    cross_region_inference_global: bool,
}

impl ModelCatalog {
    pub fn new(
        ttl: Duration,
        regions: Vec<String>,
        include_legacy: bool,
        cross_region_inference: bool,
        cross_region_inference_global: bool,
    ) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            refresh_lock: Mutex::new(()),
            next_refresh_after: RwLock::new(None),
            ttl,
            regions,
            include_legacy,
            cross_region_inference,
            cross_region_inference_global,
        }
    }

    /// Registers a non-foundation model (TTS, STT, …) outside the refresh
    /// cycle. Extra modality sets are merged, never overwritten, per
    /// spec.md §3's catalog invariants.
    pub async fn register_extra(&self, descriptor: ModelDescriptor) {
        let mut guard = self.snapshot.write().await;
        let mut next = (**guard).clone();
        next.extra.insert(descriptor.id.clone(), descriptor);
        next.rebuild_unified();
        next.rebuild_modality_indexes();
        *guard = Arc::new(next);
    }

    /// Step 1-8 of spec.md §4.3's refresh algorithm. No-ops when the TTL
    /// hasn't elapsed (idempotent under repeated calls, per spec.md §8's
    /// idempotence property).
    pub async fn refresh(&self, source: &dyn CatalogSource) -> Result<bool, CatalogError> {
        {
            let next_refresh_after = self.next_refresh_after.read().await;
            if let Some(deadline) = *next_refresh_after {
                if Instant::now() < deadline {
                    return Ok(false);
                }
            }
        }

        let _refresh_guard = self.refresh_lock.lock().await;
        {
            let next_refresh_after = self.next_refresh_after.read().await;
            if let Some(deadline) = *next_refresh_after {
                if Instant::now() < deadline {
                    return Ok(false);
                }
            }
        }

        let mut new_foundation: HashMap<String, ModelDescriptor> = HashMap::new();
        let mut unavailability: HashMap<String, String> = HashMap::new();

        for region in &self.regions {
            let foundation_models = source
                .list_foundation_models(region)
                .await
                .map_err(|e| CatalogError::RefreshFailed(e.to_string()))?;
            let provisioned = source
                .list_provisioned_models(region)
                .await
                .map_err(|e| CatalogError::RefreshFailed(e.to_string()))?;
            let profiles = source
                .list_inference_profiles(region)
                .await
                .map_err(|e| CatalogError::RefreshFailed(e.to_string()))?;

            let profile_by_model = select_profiles(profiles, self.cross_region_inference_global);

            for model in foundation_models {
                if model.legacy && !self.include_legacy {
                    continue;
                }
                let candidate_eligible = model.on_demand_supported
                    || model.inference_profile_supported
                    || (model.provisioned_supported && provisioned.contains(&model.id));
                if !candidate_eligible {
                    continue;
                }

                let availability = source
                    .check_availability(region, &model.id)
                    .await
                    .map_err(|e| CatalogError::RefreshFailed(e.to_string()))?;
                if !availability.available {
                    if let Some(reason) = availability.reason {
                        unavailability.insert(model.id.clone(), reason);
                    }
                    continue;
                }

                let descriptor = ModelDescriptor {
                    id: model.id.clone(),
                    name: model.name,
                    provider: model.provider,
                    region: region.clone(),
                    service: "inference".to_string(),
                    input_modalities: model.input_modalities,
                    output_modalities: model.output_modalities,
                    response_streaming: model.response_streaming,
                    legacy: model.legacy,
                    inference_profile_id: profile_by_model.get(&model.id).cloned(),
                };
                new_foundation.insert(model.id.clone(), descriptor);
            }
        }

        let changed = {
            let current = self.snapshot.read().await;
            current.foundation != new_foundation
        };

        if changed {
            let mut guard = self.snapshot.write().await;
            let mut next = (**guard).clone();
            next.foundation = new_foundation;
            next.unavailability = unavailability;
            next.rebuild_unified();
            next.rebuild_modality_indexes();
            *guard = Arc::new(next);
        }

        let mut next_refresh_after = self.next_refresh_after.write().await;
        *next_refresh_after = Some(Instant::now() + self.ttl);

        Ok(changed)
    }

    pub async fn get(&self, id: &str) -> Option<ModelDescriptor> {
        self.snapshot.read().await.all.get(id).cloned()
    }

    /// Validates that `id` exists and, if given, supports the required
    /// modalities. Missing ids trigger one opportunistic refresh before
    /// reporting not-found, per spec.md §4.3.
    pub async fn validate(
        &self,
        source: &dyn CatalogSource,
        id: &str,
        required_input_modality: Option<&str>,
        required_output_modality: Option<&str>,
    ) -> Result<ModelDescriptor, CatalogError> {
        let mut descriptor = self.get(id).await;
        if descriptor.is_none() {
            let _ = self.refresh(source).await;
            descriptor = self.get(id).await;
        }

        let Some(descriptor) = descriptor else {
            let available = self.list_ids().await;
            return Err(CatalogError::NotFound {
                model: deprecation::deprecation_hint(id).unwrap_or(id.to_string()),
                available,
            });
        };

        if let Some(modality) = required_input_modality {
            if !descriptor.supports_input(modality) {
                let snapshot = self.snapshot.read().await;
                let matches = snapshot
                    .input_modality_index
                    .get(&modality.to_uppercase())
                    .cloned()
                    .unwrap_or_default();
                return Err(CatalogError::ModalityMismatch {
                    model: id.to_string(),
                    modality: modality.to_string(),
                    direction: "input",
                    matches: matches.into_iter().collect(),
                });
            }
        }

        if let Some(modality) = required_output_modality {
            if !descriptor.supports_output(modality) {
                let snapshot = self.snapshot.read().await;
                let matches = snapshot
                    .output_modality_index
                    .get(&modality.to_uppercase())
                    .cloned()
                    .unwrap_or_default();
                return Err(CatalogError::ModalityMismatch {
                    model: id.to_string(),
                    modality: modality.to_string(),
                    direction: "output",
                    matches: matches.into_iter().collect(),
                });
            }
        }

        Ok(descriptor)
    }

    /// Sorted `(id, descriptor)` pairs for the OpenAI `list-of-models`
    /// payload.
    pub async fn list_for_response(&self) -> Vec<ModelDescriptor> {
        let snapshot = self.snapshot.read().await;
        let mut descriptors: Vec<ModelDescriptor> = snapshot.all.values().cloned().collect();
        descriptors.sort_by(|a, b| a.id.cmp(&b.id));
        descriptors
    }

    async fn list_ids(&self) -> Vec<String> {
        let snapshot = self.snapshot.read().await;
        let mut ids: Vec<String> = snapshot.all.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn unavailability_report(&self) -> HashMap<String, String> {
        self.snapshot.read().await.unavailability.clone()
    }

    /// Test/observability hook: whether two reads share the same
    /// underlying snapshot allocation (spec.md §8's TTL invariant).
    pub async fn snapshot_ptr_eq(&self, other: &ModelCatalog) -> bool {
        Arc::ptr_eq(&*self.snapshot.read().await, &*other.snapshot.read().await)
    }
}

/// Step 6: prefer "global" profiles when global cross-region inference is
/// enabled, otherwise pick any regional profile.
fn select_profiles(
    profiles: Vec<InferenceProfileInfo>,
    prefer_global: bool,
) -> HashMap<String, String> {
    let mut by_model: HashMap<String, InferenceProfileInfo> = HashMap::new();
    for profile in profiles {
        match by_model.get(&profile.base_model_id) {
            None => {
                by_model.insert(profile.base_model_id.clone(), profile);
            }
            Some(existing) => {
                let should_replace = prefer_global
                    && profile.scope == ProfileScope::Global
                    && existing.scope != ProfileScope::Global;
                if should_replace {
                    by_model.insert(profile.base_model_id.clone(), profile);
                }
            }
        }
    }
    by_model
        .into_iter()
        .map(|(model_id, profile)| (model_id, profile.id))
        .collect()
}
