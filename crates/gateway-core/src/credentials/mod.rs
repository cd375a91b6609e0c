//! Bearer-token credential store (C2).
//!
//! The plaintext API key is resolved once at startup from exactly one
//! configured source, hashed with a random salt, and dropped. Verification
//! never needs the plaintext again and runs in constant time with respect to
//! the presented token.

use blake2::{Blake2b512, Digest};
use rand::RngCore;
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::Zeroize;

use crate::config::ApiKeySource;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no api key source configured")]
    NotConfigured,

    #[error("failed to retrieve api key from {source_name}: {detail}")]
    RetrievalFailed { source_name: &'static str, detail: String },
}

/// Result of verifying a presented bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Ok,
    Unauthorized,
}

/// A 16-byte random salt plus the BLAKE2b-512 digest of `api_key || salt`.
///
/// Holds no copy of the plaintext key. `digest`/`salt` are private; only
/// [`CredentialStore::verify`] reads them.
#[derive(Debug)]
struct Credential {
    salt: [u8; 16],
    digest: [u8; 64],
}

/// Process-scoped singleton holding the (possibly absent) hashed credential.
#[derive(Debug)]
pub struct CredentialStore {
    credential: Option<Credential>,
}

/// Trait for the external secret sources the store can pull from. Kept
/// separate from [`CredentialStore`] so tests and the `gateway-server`
/// binary can supply real AWS SSM/Secrets Manager clients without this
/// crate depending on an AWS SDK.
#[async_trait::async_trait]
pub trait SecretResolver: Send + Sync {
    async fn get_ssm_parameter(&self, path: &str) -> Result<String, String>;
    async fn get_secretsmanager_value(&self, secret_id: &str, key: &str) -> Result<String, String>;
}

/// A resolver that only ever serves inline keys; SSM/Secrets Manager lookups
/// fail. Used when the gateway is configured with `ApiKeySource::Inline` or
/// `ApiKeySource::None`, and as the default in tests.
pub struct NullSecretResolver;

#[async_trait::async_trait]
impl SecretResolver for NullSecretResolver {
    async fn get_ssm_parameter(&self, path: &str) -> Result<String, String> {
        Err(format!("no SSM client configured to resolve '{path}'"))
    }

    async fn get_secretsmanager_value(&self, secret_id: &str, _key: &str) -> Result<String, String> {
        Err(format!(
            "no Secrets Manager client configured to resolve '{secret_id}'"
        ))
    }
}

impl CredentialStore {
    /// Resolves the API key from `source`, hashes it, and drops the
    /// plaintext. Returns `true` when authentication is enabled (a source
    /// was configured), `false` when `source` is [`ApiKeySource::None`].
    pub async fn initialize(
        source: &ApiKeySource,
        resolver: &dyn SecretResolver,
    ) -> Result<Self, CredentialError> {
        let mut plaintext = match source {
            ApiKeySource::None => return Ok(Self { credential: None }),
            ApiKeySource::Inline(key) => key.clone(),
            ApiKeySource::SsmParameter(path) => {
                resolver
                    .get_ssm_parameter(path)
                    .await
                    .map_err(|detail| CredentialError::RetrievalFailed {
                        source_name: "ssm",
                        detail,
                    })?
            }
            ApiKeySource::SecretsManager { secret_id, key } => resolver
                .get_secretsmanager_value(secret_id, key)
                .await
                .map_err(|detail| CredentialError::RetrievalFailed {
                    source_name: "secretsmanager",
                    detail,
                })?,
        };

        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);

        let mut hasher = Blake2b512::new();
        hasher.update(plaintext.as_bytes());
        hasher.update(salt);
        let digest: [u8; 64] = hasher.finalize().into();

        plaintext.zeroize();

        Ok(Self {
            credential: Some(Credential { salt, digest }),
        })
    }

    /// `true` once a credential has been hashed and stored; requests must
    /// present a matching bearer token.
    pub fn auth_enabled(&self) -> bool {
        self.credential.is_some()
    }

    /// Verifies a bearer token extracted from an `Authorization` header.
    /// Always `Ok` when no credential is configured.
    pub fn verify(&self, authorization_header: Option<&str>) -> VerifyOutcome {
        let Some(credential) = &self.credential else {
            return VerifyOutcome::Ok;
        };

        let Some(token) = authorization_header.and_then(extract_bearer) else {
            return VerifyOutcome::Unauthorized;
        };

        let mut hasher = Blake2b512::new();
        hasher.update(token.as_bytes());
        hasher.update(credential.salt);
        let presented: [u8; 64] = hasher.finalize().into();

        if presented.ct_eq(&credential.digest).into() {
            VerifyOutcome::Ok
        } else {
            VerifyOutcome::Unauthorized
        }
    }
}

fn extract_bearer(header: &str) -> Option<&str> {
    header.strip_prefix("Bearer ").map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_without_source() {
        let store = CredentialStore::initialize(&ApiKeySource::None, &NullSecretResolver)
            .await
            .unwrap();
        assert!(!store.auth_enabled());
        assert_eq!(store.verify(None), VerifyOutcome::Ok);
        assert_eq!(store.verify(Some("Bearer anything")), VerifyOutcome::Ok);
    }

    #[tokio::test]
    async fn accepts_matching_inline_key() {
        let store = CredentialStore::initialize(
            &ApiKeySource::Inline("sk-test-12345".to_string()),
            &NullSecretResolver,
        )
        .await
        .unwrap();
        assert!(store.auth_enabled());
        assert_eq!(
            store.verify(Some("Bearer sk-test-12345")),
            VerifyOutcome::Ok
        );
    }

    #[tokio::test]
    async fn rejects_wrong_key() {
        let store = CredentialStore::initialize(
            &ApiKeySource::Inline("sk-test-12345".to_string()),
            &NullSecretResolver,
        )
        .await
        .unwrap();
        assert_eq!(
            store.verify(Some("Bearer sk-wrong")),
            VerifyOutcome::Unauthorized
        );
    }

    #[tokio::test]
    async fn rejects_missing_header() {
        let store = CredentialStore::initialize(
            &ApiKeySource::Inline("sk-test-12345".to_string()),
            &NullSecretResolver,
        )
        .await
        .unwrap();
        assert_eq!(store.verify(None), VerifyOutcome::Unauthorized);
    }

    #[tokio::test]
    async fn rejects_malformed_header() {
        let store = CredentialStore::initialize(
            &ApiKeySource::Inline("sk-test-12345".to_string()),
            &NullSecretResolver,
        )
        .await
        .unwrap();
        assert_eq!(
            store.verify(Some("Basic sk-test-12345")),
            VerifyOutcome::Unauthorized
        );
    }

    #[tokio::test]
    async fn ssm_retrieval_failure_surfaces() {
        let err = CredentialStore::initialize(
            &ApiKeySource::SsmParameter("/prod/key".to_string()),
            &NullSecretResolver,
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            CredentialError::RetrievalFailed { source_name: "ssm", .. }
        ));
    }
}
