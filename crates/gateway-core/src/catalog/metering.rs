//! Marketplace metering handshake hook point (supplemented feature): an
//! optional one-time call before the catalog's first refresh. The real
//! handshake against a marketplace billing API is an external
//! collaborator, matching [`super::CatalogSource`]'s split between the
//! shape this crate fixes and the SDK call that fills it in.

use async_trait::async_trait;

use crate::config::ConfigError;

/// Invoked once at startup, before [`super::ModelCatalog::refresh`]'s
/// first call, so a marketplace subscription can be confirmed before any
/// model is advertised as available.
#[async_trait]
pub trait MeteringHandshake: Send + Sync {
    async fn handshake(&self) -> Result<(), ConfigError>;
}

/// The default when no marketplace integration is configured — always
/// succeeds, per spec.md §1's "external collaborator" scoping.
pub struct NoopMeteringHandshake;

#[async_trait]
impl MeteringHandshake for NoopMeteringHandshake {
    async fn handshake(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_handshake_always_succeeds() {
        assert!(NoopMeteringHandshake.handshake().await.is_ok());
    }
}
