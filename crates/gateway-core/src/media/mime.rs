//! MIME sniffing from raw bytes, used when a caller supplies audio/image
//! payloads without a reliable `Content-Type` (e.g. multipart uploads with
//! a generic filename).

/// Sniffs a MIME type from magic bytes, falling back to `application/octet-stream`.
pub fn sniff(bytes: &[u8]) -> String {
    infer::get(bytes)
        .map(|kind| kind.mime_type().to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

pub fn is_image(mime_type: &str) -> bool {
    mime_type.starts_with("image/")
}

pub fn is_audio(mime_type: &str) -> bool {
    mime_type.starts_with("audio/") || mime_type == "video/mp4"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_png_signature() {
        let png_header = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        assert_eq!(sniff(&png_header), "image/png");
    }

    #[test]
    fn unknown_bytes_fall_back_to_octet_stream() {
        assert_eq!(sniff(&[1, 2, 3]), "application/octet-stream");
    }

    #[test]
    fn classifies_image_and_audio_mime_types() {
        assert!(is_image("image/jpeg"));
        assert!(!is_image("audio/mpeg"));
        assert!(is_audio("audio/mpeg"));
    }
}
