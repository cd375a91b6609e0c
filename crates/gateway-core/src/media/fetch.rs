//! SSRF-safe URL fetching (supplemented feature, grounded in
//! `original_source/stdapi/security.py`'s `validate_url_ssrf`): resolves the
//! hostname before dialing and rejects any resolved address that is
//! loopback, link-local, reserved, multicast, unspecified, or (when
//! configured) private.

use std::net::IpAddr;

use url::Url;

use super::error::MediaError;

/// Resolves `url`'s hostname and rejects it if any resolved address is
/// unsafe to let the gateway dial on the caller's behalf.
pub async fn validate_url_ssrf(url: &str, block_private_networks: bool) -> Result<(), MediaError> {
    let parsed = Url::parse(url).map_err(|_| MediaError::MissingHost)?;
    let host = parsed.host_str().ok_or(MediaError::MissingHost)?;

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_unsafe_ip(ip, block_private_networks) {
            return Err(MediaError::ForbiddenHost(host.to_string()));
        }
        return Ok(());
    }

    let port = parsed.port_or_known_default().unwrap_or(443);
    let lookup_target = format!("{host}:{port}");
    let addrs = tokio::net::lookup_host(&lookup_target)
        .await
        .map_err(|e| MediaError::ResolutionFailed(e.to_string()))?;

    let mut saw_any = false;
    for addr in addrs {
        saw_any = true;
        if is_unsafe_ip(addr.ip(), block_private_networks) {
            return Err(MediaError::ForbiddenHost(host.to_string()));
        }
    }

    if !saw_any {
        return Err(MediaError::ResolutionFailed(format!("no addresses for {host}")));
    }

    Ok(())
}

fn is_unsafe_ip(ip: IpAddr, block_private_networks: bool) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_link_local()
                || v4.is_multicast()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || is_reserved_v4(v4)
                || (block_private_networks && v4.is_private())
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_multicast()
                || v6.is_unspecified()
                || (block_private_networks && is_unique_local_v6(v6))
        }
    }
}

fn is_reserved_v4(v4: std::net::Ipv4Addr) -> bool {
    let octets = v4.octets();
    matches!(octets[0], 0 | 240..=255)
}

fn is_unique_local_v6(v6: std::net::Ipv6Addr) -> bool {
    (v6.segments()[0] & 0xfe00) == 0xfc00
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loopback_literal_is_rejected() {
        let err = validate_url_ssrf("http://127.0.0.1/secrets", false).await.unwrap_err();
        assert!(matches!(err, MediaError::ForbiddenHost(_)));
    }

    #[tokio::test]
    async fn link_local_literal_is_rejected() {
        let err = validate_url_ssrf("http://169.254.169.254/latest/meta-data", false)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::ForbiddenHost(_)));
    }

    #[tokio::test]
    async fn private_network_rejected_only_when_configured() {
        assert!(validate_url_ssrf("http://10.0.0.5/", false).await.is_ok());
        let err = validate_url_ssrf("http://10.0.0.5/", true).await.unwrap_err();
        assert!(matches!(err, MediaError::ForbiddenHost(_)));
    }

    #[tokio::test]
    async fn url_without_host_is_rejected() {
        let err = validate_url_ssrf("not a url", false).await.unwrap_err();
        assert!(matches!(err, MediaError::MissingHost));
    }

    #[test]
    fn reserved_ipv4_blocks_are_unsafe() {
        assert!(is_unsafe_ip("0.0.0.1".parse().unwrap(), false));
        assert!(is_unsafe_ip("255.255.255.255".parse().unwrap(), false));
    }
}
