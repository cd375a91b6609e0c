//! Media utilities (C7): base64/data-URL codecs, MIME sniffing, SSRF-safe
//! remote fetch, image reformatting, and subprocess audio transcoding.

pub mod codec;
pub mod error;
pub mod fetch;
pub mod image;
pub mod mime;
pub mod transcode;

pub use error::MediaError;

/// Either an inline payload or a remote URL the caller referenced — the
/// shape every modality's "image_url"/"input_audio" field reduces to once
/// parsed.
pub enum MediaRef {
    Inline { mime_type: String, bytes: Vec<u8> },
    Remote(String),
}

impl MediaRef {
    pub fn parse(value: &str) -> Self {
        if codec::is_data_url(value) {
            match codec::parse_data_url(value) {
                Ok(parsed) => MediaRef::Inline {
                    mime_type: parsed.mime_type,
                    bytes: parsed.bytes,
                },
                Err(_) => MediaRef::Remote(value.to_string()),
            }
        } else {
            MediaRef::Remote(value.to_string())
        }
    }

    /// Resolves a [`MediaRef`] to bytes, validating remote URLs against
    /// SSRF before fetching.
    pub async fn resolve(
        self,
        client: &reqwest::Client,
        block_private_networks: bool,
    ) -> Result<(String, Vec<u8>), MediaError> {
        match self {
            MediaRef::Inline { mime_type, bytes } => Ok((mime_type, bytes)),
            MediaRef::Remote(url) => {
                fetch::validate_url_ssrf(&url, block_private_networks).await?;
                let response = client
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| MediaError::Transport(e.to_string()))?;
                if !response.status().is_success() {
                    return Err(MediaError::FetchFailed(response.status().as_u16()));
                }
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| MediaError::Transport(e.to_string()))?
                    .to_vec();
                let mime_type = mime::sniff(&bytes);
                Ok((mime_type, bytes))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_inline_data_url() {
        let encoded = codec::encode_base64(b"hello");
        let media_ref = MediaRef::parse(&format!("data:text/plain;base64,{encoded}"));
        assert!(matches!(media_ref, MediaRef::Inline { .. }));
    }

    #[test]
    fn parses_remote_http_url() {
        let media_ref = MediaRef::parse("https://example.com/image.png");
        assert!(matches!(media_ref, MediaRef::Remote(_)));
    }
}
