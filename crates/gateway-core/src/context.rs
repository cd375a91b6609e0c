//! Per-request context (C5), built at middleware ingress and threaded
//! explicitly through every call in the request scope — never via
//! task-locals, per spec.md §9's context-propagation design note.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Optional guardrail identity carried alongside a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardrailRef {
    pub identifier: String,
    pub version: String,
    pub trace: Option<String>,
}

/// Everything the translation and dispatch layers need about the request
/// that originated the current call. Cheap to clone — background tasks
/// take an owned copy rather than a reference.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub request_time: DateTime<Utc>,
    pub client_ip: Option<String>,
    pub guardrail: Option<GuardrailRef>,
    pub caller_identity: Option<String>,
}

impl RequestContext {
    /// Creates a fresh context with a random request id and the current
    /// time, as middleware does for every incoming request.
    pub fn new() -> Self {
        Self {
            request_id: new_request_id(),
            request_time: Utc::now(),
            client_ip: None,
            guardrail: None,
            caller_identity: None,
        }
    }

    pub fn with_client_ip(mut self, ip: Option<String>) -> Self {
        self.client_ip = ip;
        self
    }

    pub fn with_guardrail(mut self, guardrail: Option<GuardrailRef>) -> Self {
        self.guardrail = guardrail;
        self
    }

    pub fn with_caller_identity(mut self, identity: Option<String>) -> Self {
        self.caller_identity = identity;
        self
    }

    /// Milliseconds elapsed since the context was created, for the
    /// `openai-processing-ms` response header.
    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.request_time).num_milliseconds().max(0)
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

fn new_request_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_context_has_unique_ids() {
        let a = RequestContext::new();
        let b = RequestContext::new();
        assert_ne!(a.request_id, b.request_id);
    }

    #[test]
    fn elapsed_is_non_negative() {
        let ctx = RequestContext::new();
        assert!(ctx.elapsed_ms() >= 0);
    }
}
