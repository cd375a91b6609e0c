//! Builds converse content blocks (image/video/document) from the source
//! forms OpenAI clients send: inline `data:` URLs, `s3://` references, and
//! `http(s)://` URLs fetched subject to SSRF checks (spec.md §4.4's
//! content-part table).

use crate::errors::GatewayError;
use crate::media::{self, MediaRef};
use crate::translate::converse::{ContentBlock, DocumentBlock, ImageBlock, ImageSource, S3Location, VideoBlock};

/// Fetch client + SSRF policy threaded through image-block construction.
pub struct MediaResolver {
    pub client: reqwest::Client,
    pub block_private_networks: bool,
}

fn image_ext_to_format(mime_subtype: &str) -> Option<&'static str> {
    match mime_subtype {
        "png" => Some("png"),
        "jpeg" | "jpg" => Some("jpeg"),
        "gif" => Some("gif"),
        "webp" => Some("webp"),
        _ => None,
    }
}

pub async fn build_image_block(url: &str, resolver: &MediaResolver) -> Result<ContentBlock, GatewayError> {
    if let Some(s3_uri) = url.strip_prefix("s3://") {
        let ext = s3_uri.rsplit('.').next().unwrap_or("png").to_lowercase();
        let format = if ext == "jpg" { "jpeg".to_string() } else { ext };
        return Ok(ContentBlock::Image(ImageBlock {
            format,
            source: ImageSource { bytes: None, s3_location: Some(S3Location { uri: url.to_string() }) },
        }));
    }

    if media::codec::is_data_url(url) {
        let parsed = media::codec::parse_data_url(url)
            .map_err(|_| GatewayError::InvalidRequest("invalid image data URL".to_string()))?;
        let subtype = parsed.mime_type.strip_prefix("image/").unwrap_or("");
        let format = image_ext_to_format(subtype)
            .ok_or_else(|| GatewayError::InvalidRequest(format!("unsupported image MIME `{}`", parsed.mime_type)))?;
        return Ok(ContentBlock::Image(ImageBlock {
            format: format.to_string(),
            source: ImageSource { bytes: Some(media::codec::encode_base64(&parsed.bytes)), s3_location: None },
        }));
    }

    if url.starts_with("http://") || url.starts_with("https://") {
        let media_ref = MediaRef::Remote(url.to_string());
        let (mime_type, bytes) = media_ref
            .resolve(&resolver.client, resolver.block_private_networks)
            .await
            .map_err(|e| GatewayError::InvalidRequest(format!("failed to fetch image: {e}")))?;
        let subtype = mime_type.strip_prefix("image/").unwrap_or("");
        let format = image_ext_to_format(subtype)
            .ok_or_else(|| GatewayError::InvalidRequest(format!("unsupported image MIME `{mime_type}`")))?;
        return Ok(ContentBlock::Image(ImageBlock {
            format: format.to_string(),
            source: ImageSource { bytes: Some(media::codec::encode_base64(&bytes)), s3_location: None },
        }));
    }

    Err(GatewayError::InvalidRequest(format!("invalid image URL `{url}`")))
}

fn video_format_from_mime(subtype: &str) -> String {
    match subtype {
        "x-matroska" => "mkv".to_string(),
        "quicktime" => "mov".to_string(),
        "x-flv" => "flv".to_string(),
        "x-ms-wmv" => "wmv".to_string(),
        "3gpp" => "three_gp".to_string(),
        other => other.to_string(),
    }
}

/// File parts always arrive as inline base64 (spec.md §4.4), so no SSRF
/// surface applies here.
pub fn build_video_block(data_url: &str) -> Result<ContentBlock, GatewayError> {
    let parsed = media::codec::parse_data_url(data_url)
        .map_err(|_| GatewayError::InvalidRequest("invalid file data URL".to_string()))?;
    let subtype = parsed
        .mime_type
        .strip_prefix("video/")
        .ok_or_else(|| GatewayError::InvalidRequest("not a video MIME type".to_string()))?;
    Ok(ContentBlock::Video(VideoBlock {
        format: video_format_from_mime(subtype),
        source: ImageSource { bytes: Some(media::codec::encode_base64(&parsed.bytes)), s3_location: None },
    }))
}

pub fn build_document_block(data_url: &str) -> Result<ContentBlock, GatewayError> {
    let parsed = media::codec::parse_data_url(data_url)
        .map_err(|_| GatewayError::InvalidRequest("invalid file data URL".to_string()))?;

    if media::mime::is_image(&parsed.mime_type) {
        let subtype = parsed.mime_type.strip_prefix("image/").unwrap_or("");
        let format = image_ext_to_format(subtype)
            .ok_or_else(|| GatewayError::InvalidRequest(format!("unsupported image MIME `{}`", parsed.mime_type)))?;
        return Ok(ContentBlock::Image(ImageBlock {
            format: format.to_string(),
            source: ImageSource { bytes: Some(media::codec::encode_base64(&parsed.bytes)), s3_location: None },
        }));
    }

    if !parsed.mime_type.starts_with("text/") && !parsed.mime_type.starts_with("application/") {
        return Err(GatewayError::InvalidRequest(format!("unsupported file MIME `{}`", parsed.mime_type)));
    }

    let ext = parsed.mime_type.rsplit('/').next().unwrap_or("bin").to_string();
    Ok(ContentBlock::Document(DocumentBlock {
        format: ext.clone(),
        name: format!("file-{ext}"),
        source: ImageSource { bytes: Some(media::codec::encode_base64(&parsed.bytes)), s3_location: None },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn data_url_image_block_decodes_format_from_mime() {
        let encoded = media::codec::encode_base64(b"fakepng");
        let url = format!("data:image/png;base64,{encoded}");
        let resolver = MediaResolver { client: reqwest::Client::new(), block_private_networks: false };
        let block = build_image_block(&url, &resolver).await.unwrap();
        match block {
            ContentBlock::Image(img) => assert_eq!(img.format, "png"),
            _ => panic!("expected image block"),
        }
    }

    #[tokio::test]
    async fn s3_image_reference_maps_jpg_to_jpeg() {
        let resolver = MediaResolver { client: reqwest::Client::new(), block_private_networks: false };
        let block = build_image_block("s3://bucket/key.jpg", &resolver).await.unwrap();
        match block {
            ContentBlock::Image(img) => {
                assert_eq!(img.format, "jpeg");
                assert!(img.source.s3_location.is_some());
            }
            _ => panic!("expected image block"),
        }
    }

    #[tokio::test]
    async fn invalid_url_form_is_rejected() {
        let resolver = MediaResolver { client: reqwest::Client::new(), block_private_networks: false };
        assert!(build_image_block("ftp://example.com/image.png", &resolver).await.is_err());
    }

    #[test]
    fn video_mime_remap_applies() {
        let encoded = media::codec::encode_base64(b"data");
        let url = format!("data:video/x-matroska;base64,{encoded}");
        let block = build_video_block(&url).unwrap();
        match block {
            ContentBlock::Video(v) => assert_eq!(v.format, "mkv"),
            _ => panic!("expected video block"),
        }
    }

    #[test]
    fn document_block_defaults_name_from_extension() {
        let encoded = media::codec::encode_base64(b"hello");
        let url = format!("data:text/plain;base64,{encoded}");
        let block = build_document_block(&url).unwrap();
        match block {
            ContentBlock::Document(doc) => assert_eq!(doc.name, "file-plain"),
            _ => panic!("expected document block"),
        }
    }
}
