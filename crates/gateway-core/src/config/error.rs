use std::num::ParseIntError;
use thiserror::Error;

/// Errors raised while loading or validating [`super::GatewayConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: '{value}'")]
    InvalidValue { name: &'static str, value: String },

    #[error("failed to parse {name} ('{value}') as an integer: {source}")]
    IntParseError {
        name: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error(
        "at most one of api_key, api_key_ssm_parameter, api_key_secretsmanager_secret may be set"
    )]
    ConflictingApiKeySources,

    #[error("api_key_secretsmanager_key is required when api_key_secretsmanager_secret is set")]
    MissingSecretsManagerKey,

    #[error("aws_bedrock_regions must name at least one region")]
    EmptyRegionList,

    #[error("model_cache_seconds must be >= 1")]
    InvalidCacheTtl,

    #[error("default_model_params is not valid JSON: {0}")]
    InvalidModelParamsJson(serde_json::Error),

    #[error("marketplace metering handshake failed: {0}")]
    Metering(String),
}
