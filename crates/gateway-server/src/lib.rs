//! HTTP surface for the OpenAI-compatible gateway: routing, auth
//! middleware, and process wiring. The translation engine, catalog, and
//! job runtime it calls into all live in `gateway-core`.

pub mod auth;
pub mod error;
pub mod request_context;
pub mod routes;
pub mod state;

pub use error::HttpError;
pub use state::AppState;
