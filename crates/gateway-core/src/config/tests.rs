use super::*;
use std::sync::Mutex;

/// Environment variables are process-global; serialize tests that touch them.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_all() {
    for var in [
        "API_KEY",
        "API_KEY_SSM_PARAMETER",
        "API_KEY_SECRETSMANAGER_SECRET",
        "API_KEY_SECRETSMANAGER_KEY",
        "AWS_BEDROCK_REGIONS",
        "MODEL_CACHE_SECONDS",
        "DEFAULT_MODEL_PARAMS",
    ] {
        unsafe { env::remove_var(var) };
    }
}

#[test]
fn defaults_validate() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_all();
    let config = GatewayConfig::from_env().unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.api_key_source, ApiKeySource::None);
    assert_eq!(config.aws_bedrock_regions, vec!["us-east-1".to_string()]);
}

#[test]
fn rejects_conflicting_api_key_sources() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_all();
    unsafe {
        env::set_var("API_KEY", "sk-inline");
        env::set_var("API_KEY_SSM_PARAMETER", "/prod/key");
    }
    let err = GatewayConfig::from_env().unwrap_err();
    assert!(matches!(err, ConfigError::ConflictingApiKeySources));
    clear_all();
}

#[test]
fn secrets_manager_requires_key_name() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_all();
    unsafe {
        env::set_var("API_KEY_SECRETSMANAGER_SECRET", "prod/gateway");
    }
    let err = GatewayConfig::from_env().unwrap_err();
    assert!(matches!(err, ConfigError::MissingSecretsManagerKey));
    clear_all();
}

#[test]
fn empty_region_list_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_all();
    unsafe {
        env::set_var("AWS_BEDROCK_REGIONS", "  ,  ");
    }
    let err = GatewayConfig::from_env().unwrap_err();
    assert!(matches!(err, ConfigError::EmptyRegionList));
    clear_all();
}

#[test]
fn zero_cache_ttl_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_all();
    unsafe {
        env::set_var("MODEL_CACHE_SECONDS", "0");
    }
    let err = GatewayConfig::from_env().unwrap_err();
    assert!(matches!(err, ConfigError::InvalidCacheTtl));
    clear_all();
}

#[test]
fn invalid_model_params_json_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_all();
    unsafe {
        env::set_var("DEFAULT_MODEL_PARAMS", "{not json");
    }
    let err = GatewayConfig::from_env().unwrap_err();
    assert!(matches!(err, ConfigError::InvalidModelParamsJson(_)));
    clear_all();
}

#[test]
fn s3_bucket_for_region_prefers_regional_override() {
    let mut config = GatewayConfig::default();
    config.aws_s3_bucket = Some("primary-bucket".to_string());
    config
        .aws_s3_regional_buckets
        .insert("eu-west-1".to_string(), "eu-bucket".to_string());

    assert_eq!(config.s3_bucket_for_region("eu-west-1"), Some("eu-bucket"));
    assert_eq!(config.s3_bucket_for_region("us-east-1"), Some("primary-bucket"));
}
