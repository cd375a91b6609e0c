use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("invalid data URL")]
    InvalidDataUrl,

    #[error("invalid base64 payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("forbidden hostname in URL: {0}")]
    ForbiddenHost(String),

    #[error("URL has no hostname")]
    MissingHost,

    #[error("failed to resolve URL: {0}")]
    ResolutionFailed(String),

    #[error("fetch failed with status {0}")]
    FetchFailed(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unsupported image format")]
    UnsupportedImageFormat,

    #[error("image decode failed: {0}")]
    ImageDecode(String),

    #[error("ffmpeg is not installed on the server")]
    TranscoderUnavailable,

    #[error("audio transcode failed: {0}")]
    TranscodeFailed(String),
}
