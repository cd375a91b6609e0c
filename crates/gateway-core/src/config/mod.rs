//! Environment-backed gateway configuration.

pub mod error;

#[cfg(test)]
mod tests;

pub use error::ConfigError;

use std::collections::HashMap;
use std::env;

/// Source from which the bearer-token API key should be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiKeySource {
    /// No source configured — authentication is disabled.
    None,
    /// Key given directly in the environment.
    Inline(String),
    /// Key lives at this AWS SSM Parameter Store path.
    SsmParameter(String),
    /// Key lives in this AWS Secrets Manager secret, under this JSON key.
    SecretsManager { secret_id: String, key: String },
}

/// Guardrail defaults applied when a request carries no guardrail headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuardrailDefaults {
    pub identifier: Option<String>,
    pub version: Option<String>,
    pub trace: Option<String>,
}

/// Typed, validated process configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_key_source: ApiKeySource,

    pub aws_s3_bucket: Option<String>,
    pub aws_s3_regional_buckets: HashMap<String, String>,
    pub aws_s3_accelerate: bool,

    pub aws_bedrock_regions: Vec<String>,
    pub aws_bedrock_cross_region_inference: bool,
    pub aws_bedrock_cross_region_inference_global: bool,
    pub aws_bedrock_legacy: bool,
    pub aws_bedrock_marketplace_auto_subscribe: bool,
    pub aws_bedrock_guardrail: GuardrailDefaults,

    pub openai_routes_prefix: String,
    pub timezone: String,

    pub default_model_params: serde_json::Value,
    pub default_tts_model: Option<String>,

    pub tokens_estimation: bool,
    pub tokens_estimation_default_encoding: String,

    pub model_cache_seconds: u64,

    pub log_level: String,
    pub log_request_params: bool,
    pub log_client_ip: bool,

    pub strict_input_validation: bool,

    pub enable_docs: bool,
    pub enable_redoc: bool,
    pub enable_openapi_json: bool,
    pub enable_gzip: bool,
    pub enable_proxy_headers: bool,
    pub cors_allow_origins: Vec<String>,
    pub trusted_hosts: Vec<String>,

    pub ssrf_protection_block_private_networks: bool,

    pub otel_exporter_endpoint: Option<String>,

    pub bind_port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_key_source: ApiKeySource::None,
            aws_s3_bucket: None,
            aws_s3_regional_buckets: HashMap::new(),
            aws_s3_accelerate: false,
            aws_bedrock_regions: vec!["us-east-1".to_string()],
            aws_bedrock_cross_region_inference: true,
            aws_bedrock_cross_region_inference_global: false,
            aws_bedrock_legacy: false,
            aws_bedrock_marketplace_auto_subscribe: false,
            aws_bedrock_guardrail: GuardrailDefaults::default(),
            openai_routes_prefix: "/v1".to_string(),
            timezone: "UTC".to_string(),
            default_model_params: serde_json::json!({}),
            default_tts_model: None,
            tokens_estimation: true,
            tokens_estimation_default_encoding: "cl100k_base".to_string(),
            model_cache_seconds: 300,
            log_level: "info".to_string(),
            log_request_params: false,
            log_client_ip: false,
            strict_input_validation: false,
            enable_docs: false,
            enable_redoc: false,
            enable_openapi_json: false,
            enable_gzip: true,
            enable_proxy_headers: false,
            cors_allow_origins: vec!["*".to_string()],
            trusted_hosts: Vec::new(),
            ssrf_protection_block_private_networks: true,
            otel_exporter_endpoint: None,
            bind_port: 8080,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let api_key = env_nonempty("api_key");
        let api_key_ssm = env_nonempty("api_key_ssm_parameter");
        let api_key_secret = env_nonempty("api_key_secretsmanager_secret");
        let api_key_secret_key = env_nonempty("api_key_secretsmanager_key");

        let configured_sources = [api_key.is_some(), api_key_ssm.is_some(), api_key_secret.is_some()]
            .into_iter()
            .filter(|present| *present)
            .count();
        if configured_sources > 1 {
            return Err(ConfigError::ConflictingApiKeySources);
        }

        let api_key_source = if let Some(key) = api_key {
            ApiKeySource::Inline(key)
        } else if let Some(path) = api_key_ssm {
            ApiKeySource::SsmParameter(path)
        } else if let Some(secret_id) = api_key_secret {
            let key = api_key_secret_key.ok_or(ConfigError::MissingSecretsManagerKey)?;
            ApiKeySource::SecretsManager { secret_id, key }
        } else {
            ApiKeySource::None
        };

        let aws_bedrock_regions = env_nonempty("aws_bedrock_regions")
            .map(|v| split_csv(&v))
            .unwrap_or(defaults.aws_bedrock_regions);
        if aws_bedrock_regions.is_empty() {
            return Err(ConfigError::EmptyRegionList);
        }

        let model_cache_seconds =
            parse_u64_from_env("model_cache_seconds", defaults.model_cache_seconds)?;
        if model_cache_seconds == 0 {
            return Err(ConfigError::InvalidCacheTtl);
        }

        let default_model_params = match env_nonempty("default_model_params") {
            Some(raw) => serde_json::from_str(&raw).map_err(ConfigError::InvalidModelParamsJson)?,
            None => defaults.default_model_params,
        };

        Ok(Self {
            api_key_source,
            aws_s3_bucket: env_nonempty("aws_s3_bucket"),
            aws_s3_regional_buckets: env_nonempty("aws_s3_regional_buckets")
                .map(|v| parse_kv_csv(&v))
                .unwrap_or_default(),
            aws_s3_accelerate: parse_bool_from_env("aws_s3_accelerate", defaults.aws_s3_accelerate),
            aws_bedrock_regions,
            aws_bedrock_cross_region_inference: parse_bool_from_env(
                "aws_bedrock_cross_region_inference",
                defaults.aws_bedrock_cross_region_inference,
            ),
            aws_bedrock_cross_region_inference_global: parse_bool_from_env(
                "aws_bedrock_cross_region_inference_global",
                defaults.aws_bedrock_cross_region_inference_global,
            ),
            aws_bedrock_legacy: parse_bool_from_env("aws_bedrock_legacy", defaults.aws_bedrock_legacy),
            aws_bedrock_marketplace_auto_subscribe: parse_bool_from_env(
                "aws_bedrock_marketplace_auto_subscribe",
                defaults.aws_bedrock_marketplace_auto_subscribe,
            ),
            aws_bedrock_guardrail: GuardrailDefaults {
                identifier: env_nonempty("aws_bedrock_guardrail_identifier"),
                version: env_nonempty("aws_bedrock_guardrail_version"),
                trace: env_nonempty("aws_bedrock_guardrail_trace"),
            },
            openai_routes_prefix: env_nonempty("openai_routes_prefix")
                .unwrap_or(defaults.openai_routes_prefix),
            timezone: env_nonempty("timezone").unwrap_or(defaults.timezone),
            default_model_params,
            default_tts_model: env_nonempty("default_tts_model"),
            tokens_estimation: parse_bool_from_env("tokens_estimation", defaults.tokens_estimation),
            tokens_estimation_default_encoding: env_nonempty("tokens_estimation_default_encoding")
                .unwrap_or(defaults.tokens_estimation_default_encoding),
            model_cache_seconds,
            log_level: env_nonempty("log_level").unwrap_or(defaults.log_level),
            log_request_params: parse_bool_from_env(
                "log_request_params",
                defaults.log_request_params,
            ),
            log_client_ip: parse_bool_from_env("log_client_ip", defaults.log_client_ip),
            strict_input_validation: parse_bool_from_env(
                "strict_input_validation",
                defaults.strict_input_validation,
            ),
            enable_docs: parse_bool_from_env("enable_docs", defaults.enable_docs),
            enable_redoc: parse_bool_from_env("enable_redoc", defaults.enable_redoc),
            enable_openapi_json: parse_bool_from_env(
                "enable_openapi_json",
                defaults.enable_openapi_json,
            ),
            enable_gzip: parse_bool_from_env("enable_gzip", defaults.enable_gzip),
            enable_proxy_headers: parse_bool_from_env(
                "enable_proxy_headers",
                defaults.enable_proxy_headers,
            ),
            cors_allow_origins: env_nonempty("cors_allow_origins")
                .map(|v| split_csv(&v))
                .unwrap_or(defaults.cors_allow_origins),
            trusted_hosts: env_nonempty("trusted_hosts")
                .map(|v| split_csv(&v))
                .unwrap_or_default(),
            ssrf_protection_block_private_networks: parse_bool_from_env(
                "ssrf_protection_block_private_networks",
                defaults.ssrf_protection_block_private_networks,
            ),
            otel_exporter_endpoint: env_nonempty("otel_exporter_otlp_endpoint"),
            bind_port: parse_u64_from_env("port", defaults.bind_port as u64)? as u16,
        })
    }

    /// Cross-field checks that can't be expressed while parsing a single
    /// variable in isolation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.aws_bedrock_regions.is_empty() {
            return Err(ConfigError::EmptyRegionList);
        }
        if self.model_cache_seconds == 0 {
            return Err(ConfigError::InvalidCacheTtl);
        }
        Ok(())
    }

    /// The S3 bucket that async jobs in `region` should write to: the
    /// region-specific bucket if configured, otherwise the primary bucket.
    pub fn s3_bucket_for_region(&self, region: &str) -> Option<&str> {
        self.aws_s3_regional_buckets
            .get(region)
            .or(self.aws_s3_bucket.as_ref())
            .map(String::as_str)
    }
}

fn env_nonempty(name: &str) -> Option<String> {
    env::var(name.to_uppercase())
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_bool_from_env(name: &str, default: bool) -> bool {
    match env_nonempty(name) {
        Some(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

fn parse_u64_from_env(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env_nonempty(name) {
        Some(v) => v.parse().map_err(|source| ConfigError::IntParseError {
            name,
            value: v,
            source,
        }),
        None => Ok(default),
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_kv_csv(value: &str) -> HashMap<String, String> {
    value
        .split(',')
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            let k = k.trim();
            let v = v.trim();
            if k.is_empty() || v.is_empty() {
                None
            } else {
                Some((k.to_string(), v.to_string()))
            }
        })
        .collect()
}
