//! # gateway-core
//!
//! Translation engine, model catalog, and async job runtime backing an
//! OpenAI-compatible HTTP gateway in front of a cloud provider's foundation
//! model, speech, and vision primitives.
//!
//! ```text
//! OpenAI request → translate::* → provider call → translate::* → OpenAI response
//! ```
//!
//! The HTTP surface itself (routing, middleware, process entrypoint) lives in
//! the sibling `gateway-server` crate; this crate only fixes the shapes and
//! algorithms that surface consumes.
//!
//! ## Modules
//!
//! - [`config`] — environment-backed settings
//! - [`credentials`] — salted digest bearer-token store
//! - [`providers`] — per-(service, region) client pool
//! - [`catalog`] — lazily refreshed model index
//! - [`context`] — per-request propagated state
//! - [`observability`] — structured JSONL event log
//! - [`media`] — codecs, MIME sniffing, SSRF-safe fetch, transcoding
//! - [`translate`] — per-modality request/response translation
//! - [`jobs`] — async (S3-backed) job runtime
//! - [`streaming`] — SSE / chunked / transcoder plumbing
//! - [`errors`] — OpenAI error envelope + taxonomy mapping
//! - [`tokenizer`] — fallback token-count estimator
//! - [`mock`] — stub backends behind `feature = "mock"`

pub mod catalog;
pub mod config;
pub mod context;
pub mod credentials;
pub mod errors;
pub mod jobs;
pub mod media;
#[cfg(feature = "mock")]
pub mod mock;
pub mod observability;
pub mod providers;
pub mod streaming;
pub mod tokenizer;
pub mod translate;

pub use catalog::{ModelCatalog, ModelDescriptor};
pub use config::{ConfigError, GatewayConfig};
pub use context::RequestContext;
pub use credentials::{CredentialError, CredentialStore};
pub use errors::{ErrorEnvelope, GatewayError};
