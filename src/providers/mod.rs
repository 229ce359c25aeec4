pub mod gemini;
pub mod openai;
pub mod zai;

use crate::{
    config::{AuthScheme, ProviderEndpoint, StudioConfig},
    error::{Result, StudioError},
    models::{
        scrub_secrets, ApiKey, ErrorKind, GenerationRequest, GenerationResult, Provider,
        TestOutcome,
    },
    transport::{HttpRequest, HttpResponse},
};
use reqwest::Url;
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};

pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;
pub use zai::ZaiAdapter;

/// Per-provider request encoding and response classification.
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    fn endpoint(&self) -> &ProviderEndpoint;

    fn requires_key(&self) -> bool {
        true
    }

    fn build_request(&self, request: &GenerationRequest) -> Result<HttpRequest>;

    /// Classifies a provider response. Rate-limit results carry the cooldown
    /// the controller should apply in `retry_after_secs`.
    fn parse_response(&self, response: &HttpResponse) -> GenerationResult;

    /// A minimal, low-cost request that only proves the key authenticates.
    fn build_key_probe(&self, api_key: &ApiKey) -> Result<HttpRequest>;

    fn interpret_key_probe(&self, response: &HttpResponse) -> TestOutcome;
}

pub type AdapterMap = HashMap<Provider, Arc<dyn ProviderAdapter>>;

/// The built-in adapters, one per provider.
pub fn default_adapters(config: &StudioConfig) -> AdapterMap {
    let adapters: [Arc<dyn ProviderAdapter>; 3] = [
        Arc::new(OpenAiAdapter::new(config.openai.clone())),
        Arc::new(GeminiAdapter::new(config.gemini.clone())),
        Arc::new(ZaiAdapter::new(config.zai.clone())),
    ];
    adapters
        .into_iter()
        .map(|adapter| (adapter.provider(), adapter))
        .collect()
}

/// Attaches the key the way the endpoint's auth scheme expects it.
pub(crate) fn authorize(
    endpoint: &ProviderEndpoint,
    request: HttpRequest,
    api_key: &ApiKey,
) -> Result<HttpRequest> {
    match endpoint.auth {
        AuthScheme::Bearer => Ok(request.with_bearer(api_key.expose())),
        AuthScheme::QueryKey => {
            let mut url = Url::parse(&request.url).map_err(|e| {
                StudioError::Request(format!(
                    "invalid request url {}: {}",
                    scrub_secrets(&request.url),
                    e
                ))
            })?;
            url.query_pairs_mut().append_pair("key", api_key.expose());
            Ok(HttpRequest {
                url: url.to_string(),
                ..request
            })
        }
    }
}

/// The `error` object most providers embed in their JSON bodies.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct ErrorBody {
    pub code: Option<String>,
    pub message: Option<String>,
    pub status: Option<String>,
    pub reasons: Vec<String>,
}

impl ErrorBody {
    pub fn from_json(json: &Value) -> Option<Self> {
        let error = json.get("error")?;
        if error.is_null() {
            return None;
        }
        if let Some(message) = error.as_str() {
            return Some(Self {
                message: Some(message.to_string()),
                ..Default::default()
            });
        }

        let reasons = error
            .get("details")
            .and_then(Value::as_array)
            .map(|details| {
                details
                    .iter()
                    .filter_map(|d| d.get("reason").and_then(Value::as_str))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            code: error.get("code").and_then(code_string),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .filter(|m| !m.trim().is_empty())
                .map(String::from),
            status: error.get("status").and_then(Value::as_str).map(String::from),
            reasons,
        })
    }

    pub fn message_or(&self, fallback: &str) -> String {
        self.message.clone().unwrap_or_else(|| fallback.to_string())
    }

    pub fn has_reason(&self, reason: &str) -> bool {
        self.reasons.iter().any(|r| r == reason)
    }
}

/// Business codes arrive both as strings (`"1301"`) and numbers (`400`).
pub(crate) fn code_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn first_image_url(json: &Value) -> Option<String> {
    json.get("data")?
        .as_array()?
        .iter()
        .find_map(|item| item.get("url").and_then(Value::as_str))
        .filter(|url| !url.is_empty())
        .map(String::from)
}

/// Unexpected statuses are reported as transient failures.
pub(crate) fn unexpected_status(
    provider: Provider,
    response: &HttpResponse,
    error: Option<&ErrorBody>,
) -> GenerationResult {
    let detail = error
        .and_then(|e| e.message.clone())
        .unwrap_or_else(|| snippet(&response.body));
    GenerationResult::error(
        ErrorKind::Network,
        format!(
            "{} returned HTTP {}: {}",
            provider.display_name(),
            response.status,
            detail
        ),
    )
}

pub(crate) fn malformed(provider: Provider, detail: impl AsRef<str>) -> GenerationResult {
    GenerationResult::error(
        ErrorKind::MalformedResponse,
        format!(
            "{} sent a response without an image: {}",
            provider.display_name(),
            detail.as_ref()
        ),
    )
}

pub(crate) fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    let mut out: String = trimmed.chars().take(200).collect();
    if trimmed.chars().count() > 200 {
        out.push('…');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_body_parsing() {
        let zai = ErrorBody::from_json(&json!({"error": {"code": "1301", "message": "unsafe"}}))
            .unwrap();
        assert_eq!(zai.code.as_deref(), Some("1301"));
        assert_eq!(zai.message.as_deref(), Some("unsafe"));

        let gemini = ErrorBody::from_json(&json!({
            "error": {
                "code": 400,
                "message": "API key not valid.",
                "status": "INVALID_ARGUMENT",
                "details": [{"reason": "API_KEY_INVALID"}]
            }
        }))
        .unwrap();
        assert_eq!(gemini.code.as_deref(), Some("400"));
        assert!(gemini.has_reason("API_KEY_INVALID"));

        assert!(ErrorBody::from_json(&json!({"error": null})).is_none());
        assert!(ErrorBody::from_json(&json!({"data": []})).is_none());
    }

    #[test]
    fn test_first_image_url() {
        assert_eq!(
            first_image_url(&json!({"data": [{"url": "http://x"}]})).as_deref(),
            Some("http://x")
        );
        assert!(first_image_url(&json!({"data": []})).is_none());
        assert!(first_image_url(&json!({"data": [{"url": ""}]})).is_none());
    }

    #[test]
    fn test_default_adapters_cover_every_provider() {
        let adapters = default_adapters(&StudioConfig::new());
        for provider in Provider::all() {
            assert_eq!(adapters[&provider].provider(), provider);
        }
    }

    #[test]
    fn test_authorize_follows_auth_scheme() {
        let key = ApiKey::new("sk-live+abc/123=");
        let bearer = authorize(
            &ProviderEndpoint::openai(),
            HttpRequest::get("https://api.openai.com/v1/models"),
            &key,
        )
        .unwrap();
        assert_eq!(bearer.url, "https://api.openai.com/v1/models");
        assert_eq!(bearer.header("Authorization"), Some("Bearer sk-live+abc/123="));

        let mut endpoint = ProviderEndpoint::openai();
        endpoint.auth = AuthScheme::QueryKey;
        let query = authorize(
            &endpoint,
            HttpRequest::get("https://api.openai.com/v1/models"),
            &key,
        )
        .unwrap();
        assert_eq!(
            query.url,
            "https://api.openai.com/v1/models?key=sk-live%2Babc%2F123%3D"
        );
        assert!(query.header("Authorization").is_none());
    }

    #[test]
    fn test_authorize_rejects_unparseable_url() {
        let result = authorize(
            &ProviderEndpoint::gemini(),
            HttpRequest::get("not a url"),
            &ApiKey::new("AIzaTestKey123456"),
        );
        assert!(matches!(result, Err(StudioError::Request(_))));
    }

    #[test]
    fn test_snippet_truncates() {
        let long = "x".repeat(500);
        assert_eq!(snippet(&long).chars().count(), 201);
        assert_eq!(snippet("  "), "empty response body");
    }
}
