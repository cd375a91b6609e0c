use thiserror::Error;

/// Transport/provider-level failure, upstream of [`crate::errors::GatewayError`].
/// Adapters map this into a `GatewayError` via
/// [`crate::errors::map_provider_error`] once they have the provider error
/// code in hand.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider returned status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("provider returned malformed response: {0}")]
    MalformedResponse(String),

    #[error("provider error {code}: {message}")]
    Provider { code: String, message: String },
}

impl ProviderError {
    pub fn from_transport(err: reqwest::Error) -> Self {
        ProviderError::Transport(err.to_string())
    }

    /// `true` for errors worth retrying (timeouts, connect failures, 5xx).
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Transport(_) => true,
            ProviderError::HttpStatus { status, .. } => *status >= 500,
            ProviderError::MalformedResponse(_) => false,
            ProviderError::Provider { code, .. } => {
                matches!(code.as_str(), "ThrottlingException" | "ServiceUnavailableException")
            }
        }
    }
}
