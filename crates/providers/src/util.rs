//! Shared utility functions for provider adapters.

use axon_domain::config::ProviderConfig;
use axon_domain::error::{Error, Result};

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// Anything that never reached the endpoint (connect, TLS, timeout) is an
/// `ApiConnection` and therefore retryable.
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    Error::ApiConnection(e.to_string())
}

/// Classify a non-success HTTP status from a vendor endpoint.
///
/// 429 → `RateLimited`, 5xx → `Internal` (both retried with backoff);
/// every other 4xx → `InvalidRequest` (never retried).
pub(crate) fn classify_status(provider: &str, status: u16, body: &str) -> Error {
    let message = format!("{provider}: HTTP {status} - {}", snippet(body, 400));
    if status == 429 {
        Error::RateLimited(message)
    } else if status >= 500 {
        Error::Internal(message)
    } else {
        Error::InvalidRequest(message)
    }
}

/// Resolve the API key for a provider from the environment.
///
/// Uses `api_key_env` when configured, otherwise the conventional variable
/// for the provider kind (`ANTHROPIC_API_KEY` / `OPENAI_API_KEY`).
pub fn resolve_api_key(cfg: &ProviderConfig, default_env: &str) -> Result<String> {
    let env_var = cfg.api_key_env.as_deref().unwrap_or(default_env);
    std::env::var(env_var).map_err(|_| {
        Error::Config(format!(
            "provider '{}': environment variable '{env_var}' not set",
            cfg.id
        ))
    })
}

fn snippet(s: &str, max: usize) -> &str {
    let mut end = max.min(s.len());
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use axon_domain::config::ProviderKind;

    #[test]
    fn status_classification() {
        assert!(matches!(
            classify_status("p", 429, "slow down"),
            Error::RateLimited(_)
        ));
        assert!(matches!(
            classify_status("p", 503, "unavailable"),
            Error::Internal(_)
        ));
        assert!(matches!(
            classify_status("p", 400, "bad request"),
            Error::InvalidRequest(_)
        ));
        assert!(matches!(
            classify_status("p", 404, "nope"),
            Error::InvalidRequest(_)
        ));
    }

    #[test]
    fn api_key_resolution_prefers_configured_env() {
        let var = "AXON_TEST_PROVIDER_KEY_4242";
        std::env::set_var(var, "sk-test");
        let cfg = ProviderConfig {
            id: "test".into(),
            kind: ProviderKind::OpenaiCompat,
            base_url: None,
            api_key_env: Some(var.into()),
            default_model: None,
            max_connections: 8,
            request_timeout_sec: 120,
        };
        assert_eq!(resolve_api_key(&cfg, "UNUSED_DEFAULT").unwrap(), "sk-test");
        std::env::remove_var(var);
    }

    #[test]
    fn missing_key_is_a_config_error() {
        let cfg = ProviderConfig {
            id: "test".into(),
            kind: ProviderKind::OpenaiCompat,
            base_url: None,
            api_key_env: Some("AXON_TEST_NONEXISTENT_9999".into()),
            default_model: None,
            max_connections: 8,
            request_timeout_sec: 120,
        };
        let err = resolve_api_key(&cfg, "ALSO_MISSING").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
