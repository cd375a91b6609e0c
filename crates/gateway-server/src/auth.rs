//! Bearer-token authentication middleware, grounded in the corpus's
//! `from_fn_with_state` + `Authorization` header pattern, but delegating
//! the actual comparison to [`gateway_core::credentials::CredentialStore`]
//! rather than re-implementing constant-time comparison here.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use gateway_core::credentials::VerifyOutcome;
use gateway_core::errors::GatewayError;

use crate::error::HttpError;
use crate::state::AppState;

pub async fn require_bearer_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.credentials.auth_enabled() {
        return next.run(request).await;
    }

    let header = request.headers().get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok());

    match state.credentials.verify(header) {
        VerifyOutcome::Ok => next.run(request).await,
        VerifyOutcome::Unauthorized => {
            HttpError::from(GatewayError::Unauthorized("missing or invalid bearer token".to_string())).into_response()
        }
    }
}
