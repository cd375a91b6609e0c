//! Per-modality translation cores (C8/C9): one module per spec.md
//! §4.4/§4.5 subsection, sharing the `Adapter` contract below.

pub mod chat;
pub mod converse;
pub mod embeddings;
pub mod images;
pub mod media_blocks;
pub mod registry;
pub mod speech;
pub mod transcription;
pub mod translation;

pub use registry::{Adapter, AdapterRegistry};
