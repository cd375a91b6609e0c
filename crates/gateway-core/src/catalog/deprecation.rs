//! Static retired-model → replacement-model table (supplemented feature,
//! grounded in `original_source/stdapi/models/deprecation.py`), consulted by
//! [`super::ModelCatalog::validate`] to attach a "use X instead" hint.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Retired model id → suggested replacement id. Populated with the
/// deprecations this gateway is aware of; grows over time as providers
/// retire models.
pub static DEPRECATED_MODELS: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("anthropic.claude-v1", "anthropic.claude-3-5-sonnet"),
        ("anthropic.claude-v2", "anthropic.claude-3-5-sonnet"),
        ("anthropic.claude-instant-v1", "anthropic.claude-3-haiku"),
        ("amazon.titan-text-express-v1", "amazon.nova-pro"),
    ])
});

/// Returns a human-readable hint when `model_id` has a known replacement.
pub fn deprecation_hint(model_id: &str) -> Option<String> {
    DEPRECATED_MODELS
        .get(model_id)
        .map(|replacement| format!("`{model_id}` was retired; use `{replacement}` instead."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_deprecation_has_hint() {
        let hint = deprecation_hint("anthropic.claude-v1").unwrap();
        assert!(hint.contains("anthropic.claude-3-5-sonnet"));
    }

    #[test]
    fn unknown_model_has_no_hint() {
        assert!(deprecation_hint("some.unknown-model").is_none());
    }
}
