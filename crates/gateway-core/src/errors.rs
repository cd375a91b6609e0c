//! Error taxonomy and OpenAI error-envelope construction (C12), table-driven
//! per spec.md §4.8/§7 and grounded in
//! `original_source/stdapi/openai_exceptions.py`'s `OpenaiError` hierarchy.

use serde::Serialize;
use thiserror::Error;

/// The OpenAI `error.type` taxonomy (spec.md §7).
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    InvalidRequest,
    Authentication,
    Permission,
    NotFound,
    RateLimit,
    Server,
}

/// `{"error": {"message", "type", "param", "code"}}`, constructed through a
/// single constructor so every failure path guarantees field presence
/// (spec.md §9 design note).
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    pub param: Option<String>,
    pub code: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(
        message: impl Into<String>,
        error_type: ErrorType,
        param: Option<String>,
        code: Option<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                message: message.into(),
                error_type,
                param,
                code,
            },
        }
    }
}

/// The gateway's unified failure type. Every component error converts into
/// one of these variants; [`GatewayError::http_status`] and
/// [`GatewayError::into_envelope`] implement spec.md §4.8's table.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("unsupported parameter: '{param}' is not supported with this model")]
    UnsupportedParameter { param: String },

    #[error("the model `{model}` does not exist or you do not have access to it")]
    ModelNotFound {
        model: String,
        available_models: Vec<String>,
    },

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{message}")]
    RateLimited { message: String, code: Option<String> },

    #[error("{message}")]
    ProviderValidation { message: String, code: Option<String> },

    #[error("{message}")]
    ProviderUnavailable { message: String, code: Option<String> },

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn http_status(&self) -> u16 {
        match self {
            GatewayError::InvalidRequest(_)
            | GatewayError::UnsupportedParameter { .. }
            | GatewayError::ProviderValidation { .. } => 400,
            GatewayError::Unauthorized(_) => 401,
            GatewayError::Forbidden(_) => 403,
            GatewayError::ModelNotFound { .. } | GatewayError::NotFound(_) => 404,
            GatewayError::RateLimited { .. } => 429,
            GatewayError::ProviderUnavailable { .. } => 503,
            GatewayError::Internal(_) => 500,
        }
    }

    /// 401/403 are sanitized to a generic message regardless of the
    /// underlying cause (spec.md §7).
    pub fn into_envelope(self) -> ErrorEnvelope {
        match self {
            GatewayError::InvalidRequest(message) => {
                ErrorEnvelope::new(message, ErrorType::InvalidRequest, None, None)
            }
            GatewayError::UnsupportedParameter { param } => ErrorEnvelope::new(
                format!("Unsupported parameter: '{param}' is not supported with this model."),
                ErrorType::InvalidRequest,
                Some(param),
                Some("unsupported_parameter".to_string()),
            ),
            GatewayError::ModelNotFound {
                model,
                available_models,
            } => {
                let hint = if available_models.is_empty() {
                    String::new()
                } else {
                    format!(" Available models: {}", available_models.join(", "))
                };
                ErrorEnvelope::new(
                    format!(
                        "The model `{model}` does not exist or you do not have access to it.{hint}"
                    ),
                    ErrorType::InvalidRequest,
                    None,
                    Some("model_not_found".to_string()),
                )
            }
            GatewayError::Unauthorized(_) => {
                ErrorEnvelope::new("Unauthorized", ErrorType::Authentication, None, None)
            }
            GatewayError::Forbidden(_) => {
                ErrorEnvelope::new("Forbidden", ErrorType::Permission, None, None)
            }
            GatewayError::NotFound(message) => {
                ErrorEnvelope::new(message, ErrorType::NotFound, None, None)
            }
            GatewayError::RateLimited { message, code } => {
                ErrorEnvelope::new(message, ErrorType::RateLimit, None, code)
            }
            GatewayError::ProviderValidation { message, code } => {
                ErrorEnvelope::new(message, ErrorType::InvalidRequest, None, code)
            }
            GatewayError::ProviderUnavailable { message, code } => {
                ErrorEnvelope::new(message, ErrorType::Server, None, code)
            }
            GatewayError::Internal(message) => {
                ErrorEnvelope::new(message, ErrorType::Server, None, None)
            }
        }
    }
}

/// Maps a provider error code (spec.md §4.8's "Provider …" rows) onto a
/// `GatewayError` variant.
pub fn map_provider_error(code: &str, message: impl Into<String>) -> GatewayError {
    let message = message.into();
    match code {
        "ThrottlingException" | "TooManyRequestsException" => GatewayError::RateLimited {
            message,
            code: Some(code.to_string()),
        },
        "AccessDeniedException" => GatewayError::Forbidden(message),
        "UnrecognizedClientException" | "ExpiredTokenException" | "SignatureDoesNotMatchException" => {
            GatewayError::Unauthorized(message)
        }
        "ResourceNotFoundException" => GatewayError::NotFound(message),
        "ValidationException" => GatewayError::ProviderValidation {
            message,
            code: Some(code.to_string()),
        },
        "InternalServerException" | "ServiceUnavailableException" | "ModelTimeoutException" => {
            GatewayError::ProviderUnavailable {
                message,
                code: Some(code.to_string()),
            }
        }
        _ => GatewayError::ProviderUnavailable {
            message,
            code: Some(code.to_string()),
        },
    }
}

impl From<crate::providers::ProviderError> for GatewayError {
    fn from(err: crate::providers::ProviderError) -> Self {
        use crate::providers::ProviderError;
        match err {
            ProviderError::Transport(message) => GatewayError::ProviderUnavailable { message, code: None },
            ProviderError::HttpStatus { status: 429, body } => GatewayError::RateLimited { message: body, code: None },
            ProviderError::HttpStatus { status, body } if status >= 500 => {
                GatewayError::ProviderUnavailable { message: body, code: Some(status.to_string()) }
            }
            ProviderError::HttpStatus { body, .. } => GatewayError::ProviderValidation { message: body, code: None },
            ProviderError::MalformedResponse(message) => GatewayError::Internal(message),
            ProviderError::Provider { code, message } => map_provider_error(&code, message),
        }
    }
}

impl From<crate::jobs::JobError> for GatewayError {
    fn from(err: crate::jobs::JobError) -> Self {
        use crate::jobs::JobError;
        match err {
            JobError::InvocationFailed(message) => GatewayError::ProviderValidation { message, code: None },
            other => GatewayError::Internal(other.to_string()),
        }
    }
}

impl From<crate::catalog::CatalogError> for GatewayError {
    fn from(err: crate::catalog::CatalogError) -> Self {
        use crate::catalog::CatalogError;
        match err {
            CatalogError::NotFound { model, available } => GatewayError::ModelNotFound { model, available_models: available },
            CatalogError::ModalityMismatch { model, modality, direction, matches } => GatewayError::InvalidRequest(format!(
                "model `{model}` does not support {modality} {direction}; matching models: {matches:?}"
            )),
            CatalogError::RefreshFailed(message) => GatewayError::ProviderUnavailable { message, code: None },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_not_found_is_404_invalid_request() {
        let err = GatewayError::ModelNotFound {
            model: "gpt-mystery".to_string(),
            available_models: vec!["claude-3".to_string()],
        };
        assert_eq!(err.http_status(), 404);
        let envelope = err.into_envelope();
        assert_eq!(envelope.error.code.as_deref(), Some("model_not_found"));
        assert!(envelope.error.message.contains("Available models"));
    }

    #[test]
    fn unauthorized_message_is_sanitized() {
        let err = GatewayError::Unauthorized("expired signature from upstream vault".to_string());
        let envelope = err.into_envelope();
        assert_eq!(envelope.error.message, "Unauthorized");
    }

    #[test]
    fn forbidden_message_is_sanitized() {
        let err = GatewayError::Forbidden("some internal detail".to_string());
        let envelope = err.into_envelope();
        assert_eq!(envelope.error.message, "Forbidden");
    }

    #[test]
    fn throttling_maps_to_429_rate_limit() {
        let err = map_provider_error("ThrottlingException", "slow down");
        assert_eq!(err.http_status(), 429);
    }

    #[test]
    fn access_denied_maps_to_403_permission() {
        let err = map_provider_error("AccessDeniedException", "nope");
        assert_eq!(err.http_status(), 403);
        assert!(matches!(
            err.into_envelope().error.error_type,
            ErrorType::Permission
        ));
    }

    #[test]
    fn unsupported_parameter_carries_param_name() {
        let err = GatewayError::UnsupportedParameter {
            param: "logit_bias".to_string(),
        };
        let envelope = err.into_envelope();
        assert_eq!(envelope.error.param.as_deref(), Some("logit_bias"));
        assert_eq!(
            envelope.error.code.as_deref(),
            Some("unsupported_parameter")
        );
    }

    #[test]
    fn provider_error_http_429_maps_to_rate_limited() {
        let err: GatewayError = crate::providers::ProviderError::HttpStatus { status: 429, body: "slow down".to_string() }.into();
        assert_eq!(err.http_status(), 429);
    }

    #[test]
    fn catalog_not_found_maps_to_model_not_found() {
        let err: GatewayError = crate::catalog::CatalogError::NotFound { model: "x".to_string(), available: vec!["y".to_string()] }.into();
        assert!(matches!(err, GatewayError::ModelNotFound { .. }));
    }

    #[test]
    fn job_invocation_failed_maps_to_provider_validation() {
        let err: GatewayError = crate::jobs::JobError::InvocationFailed("bad payload".to_string()).into();
        assert!(matches!(err, GatewayError::ProviderValidation { .. }));
    }
}
