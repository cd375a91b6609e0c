use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("model `{model}` does not exist or you do not have access to it")]
    NotFound { model: String, available: Vec<String> },

    #[error(
        "model `{model}` does not support {modality} {direction}; matching models: {matches:?}"
    )]
    ModalityMismatch {
        model: String,
        modality: String,
        direction: &'static str,
        matches: Vec<String>,
    },

    #[error("catalog refresh failed: {0}")]
    RefreshFailed(String),
}
