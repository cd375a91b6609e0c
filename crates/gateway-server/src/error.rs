//! Wraps [`gateway_core::GatewayError`] in `axum::response::IntoResponse`,
//! the same split the teacher keeps between its own `GatewayError` enum
//! (`gateway/error.rs`) and the HTTP layer — except here the taxonomy
//! itself already lives in `gateway-core`, so this type only adds the
//! transport-specific headers spec.md §6 calls for.

use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use gateway_core::GatewayError;

pub struct HttpError(pub GatewayError);

impl From<GatewayError> for HttpError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let envelope = self.0.into_envelope();

        let mut headers = HeaderMap::new();
        headers.insert("openai-version", HeaderValue::from_static("2020-10-01"));

        (status, headers, Json(envelope)).into_response()
    }
}
