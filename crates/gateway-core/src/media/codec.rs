//! Base64 and `data:` URL codecs shared by every modality that accepts
//! inline media (images in chat messages, TTS/STT audio payloads).

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::error::MediaError;

pub fn decode_base64(input: &str) -> Result<Vec<u8>, MediaError> {
    Ok(STANDARD.decode(input)?)
}

pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// A parsed `data:<mime>;base64,<payload>` URL.
#[derive(Debug)]
pub struct DataUrl {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Parses a `data:` URL. Only the base64-encoded form is supported, which
/// is the only form OpenAI-compatible clients send.
pub fn parse_data_url(url: &str) -> Result<DataUrl, MediaError> {
    let rest = url.strip_prefix("data:").ok_or(MediaError::InvalidDataUrl)?;
    let (header, payload) = rest.split_once(',').ok_or(MediaError::InvalidDataUrl)?;
    let mime_type = header.strip_suffix(";base64").ok_or(MediaError::InvalidDataUrl)?;
    if mime_type.is_empty() {
        return Err(MediaError::InvalidDataUrl);
    }
    let bytes = decode_base64(payload)?;
    Ok(DataUrl {
        mime_type: mime_type.to_string(),
        bytes,
    })
}

pub fn is_data_url(url: &str) -> bool {
    url.starts_with("data:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_base64() {
        let bytes = b"hello world";
        let encoded = encode_base64(bytes);
        assert_eq!(decode_base64(&encoded).unwrap(), bytes);
    }

    #[test]
    fn parses_valid_data_url() {
        let encoded = encode_base64(b"\x89PNG...");
        let url = format!("data:image/png;base64,{encoded}");
        let parsed = parse_data_url(&url).unwrap();
        assert_eq!(parsed.mime_type, "image/png");
        assert_eq!(parsed.bytes, b"\x89PNG...");
    }

    #[test]
    fn rejects_non_base64_data_url() {
        let err = parse_data_url("data:text/plain,hello").unwrap_err();
        assert!(matches!(err, MediaError::InvalidDataUrl));
    }

    #[test]
    fn rejects_malformed_data_url() {
        assert!(parse_data_url("not-a-data-url").is_err());
    }
}
