//! Model provider names
//!
//! Producers report the provider either as an id (`anthropic`) or as the
//! API base URL the CLI was pointed at. URLs are mapped to a short id so the
//! dashboard groups them.

use crate::types::UNKNOWN_MODEL;

/// Providers with an Anthropic-compatible endpoint: (id, base URL)
const KNOWN_PROVIDERS: &[(&str, &str)] = &[
    ("anthropic", "https://api.anthropic.com"),
    ("deepseek", "https://api.deepseek.com/anthropic"),
    ("zai", "https://api.z.ai/api/anthropic"),
    ("moonshot", "https://api.moonshot.ai/anthropic"),
];

/// Provider id for a base URL.
///
/// Exact match first, then prefix match, then `custom (<host>)`.
pub fn provider_for_url(base_url: &str) -> String {
    let url = base_url.trim().trim_end_matches('/');
    if url.is_empty() {
        return "anthropic".to_string();
    }

    if let Some((id, _)) = KNOWN_PROVIDERS.iter().find(|(_, known)| *known == url) {
        return id.to_string();
    }
    if let Some((id, _)) = KNOWN_PROVIDERS.iter().find(|(_, known)| url.starts_with(known)) {
        return id.to_string();
    }

    match url.split_once("//") {
        Some((_, rest)) => {
            let host = rest.split('/').next().unwrap_or_default();
            let host = host.split(':').next().unwrap_or_default();
            format!("custom ({})", host)
        }
        None => "custom".to_string(),
    }
}

/// Normalised provider for a `(provider, model)` pair as sent by a producer.
///
/// A missing provider with a known model is assumed to be Anthropic; ids pass
/// through untouched; URLs go through [`provider_for_url`].
pub fn resolve_provider(provider: Option<&str>, model_name: Option<&str>) -> String {
    let provider = provider.map(str::trim).unwrap_or_default();
    let model_name = model_name.map(str::trim).unwrap_or_default();

    if provider.is_empty() || provider.eq_ignore_ascii_case(UNKNOWN_MODEL) {
        if model_name.is_empty() || model_name.eq_ignore_ascii_case(UNKNOWN_MODEL) {
            return UNKNOWN_MODEL.to_string();
        }
        return "anthropic".to_string();
    }

    if provider.starts_with("http") {
        provider_for_url(provider)
    } else {
        provider.to_string()
    }
}
