use super::{
    authorize, first_image_url, malformed, snippet, unexpected_status, ErrorBody,
    ProviderAdapter,
};
use crate::{
    config::{ProviderEndpoint, DAILY_QUOTA_COOLDOWN_SECS},
    error::Result,
    models::{
        ApiKey, ErrorKind, GenerationError, GenerationRequest, GenerationResult, ImagePayload,
        Provider, TestOutcome,
    },
    transport::{HttpRequest, HttpResponse},
};
use serde_json::json;

const GENERATIONS_PATH: &str = "api/paas/v4/images/generations";
const CHAT_PATH: &str = "api/paas/v4/chat/completions";
const PROBE_MODEL: &str = "glm-4-flash";

const AUTH_CODES: [&str; 6] = ["1000", "1001", "1002", "1003", "1004", "1113"];
const POLICY_CODES: [&str; 2] = ["1300", "1301"];
const QUOTA_CODES: [&str; 2] = ["1304", "1308"];

/// CogView-4 over the Z.AI (Zhipu BigModel) open platform.
#[derive(Debug, Clone)]
pub struct ZaiAdapter {
    endpoint: ProviderEndpoint,
}

/// User-facing text for a documented Z.AI business code.
pub fn describe_code(code: &str) -> Option<&'static str> {
    let text = match code {
        "1000" => "Authentication failed. Check your Z.AI API key.",
        "1001" => "The Authorization header is missing.",
        "1002" => "Invalid API key. Check your Z.AI API key.",
        "1003" => "Your Z.AI API key has expired. Create a new one.",
        "1004" => "Authentication failed: the API key was rejected.",
        "1113" => "Your Z.AI account is in arrears. Recharge to continue.",
        "1214" => "Invalid request parameter.",
        "1300" | "1301" => "The prompt was blocked by the Z.AI content safety policy.",
        "1302" => "Too many concurrent requests. Wait a moment and try again.",
        "1303" => "Request frequency is too high. Slow down.",
        "1304" => "Daily call limit reached. Try again tomorrow.",
        "1305" => "The service is under heavy load. Try again later.",
        "1308" => "Usage limit reached for this period.",
        "1309" => "Your Z.AI plan has expired.",
        _ => return None,
    };
    Some(text)
}

impl ZaiAdapter {
    pub fn new(endpoint: ProviderEndpoint) -> Self {
        Self { endpoint }
    }

    fn error_for(kind: ErrorKind, error: Option<&ErrorBody>, fallback: &str) -> GenerationError {
        let code = error.and_then(|e| e.code.clone());
        let provider_message = error.and_then(|e| e.message.clone());
        let message = match (code.as_deref().and_then(describe_code), provider_message) {
            (Some(text), Some(detail)) if kind == ErrorKind::BadRequest => {
                format!("{} {}", text, detail)
            }
            (Some(text), _) => text.to_string(),
            (None, Some(detail)) => detail,
            (None, None) => fallback.to_string(),
        };
        let err = GenerationError::new(kind, message);
        match code {
            Some(code) => err.with_code(code),
            None => err,
        }
    }

    fn has_code(error: Option<&ErrorBody>, codes: &[&str]) -> bool {
        error
            .and_then(|e| e.code.as_deref())
            .is_some_and(|code| codes.contains(&code))
    }
}

impl ProviderAdapter for ZaiAdapter {
    fn provider(&self) -> Provider {
        Provider::ZaiCogView
    }

    fn endpoint(&self) -> &ProviderEndpoint {
        &self.endpoint
    }

    fn build_request(&self, request: &GenerationRequest) -> Result<HttpRequest> {
        let body = json!({
            "model": Provider::ZaiCogView.model(),
            "prompt": request.prompt,
            "size": "1024x1024",
            "quality": request.quality.as_str(),
        });

        authorize(
            &self.endpoint,
            HttpRequest::post(self.endpoint.url(GENERATIONS_PATH), body),
            &request.api_key,
        )
    }

    fn parse_response(&self, response: &HttpResponse) -> GenerationResult {
        let json = response.json();
        let error = json.as_ref().and_then(ErrorBody::from_json);
        let error = error.as_ref();

        // policy codes show up under both 200 and 400
        if Self::has_code(error, &POLICY_CODES) {
            return GenerationResult::Error(Self::error_for(
                ErrorKind::ContentPolicy,
                error,
                "Content blocked",
            ));
        }

        match response.status {
            429 => {
                let cooldown = if Self::has_code(error, &QUOTA_CODES) {
                    DAILY_QUOTA_COOLDOWN_SECS
                } else {
                    self.endpoint.rate_limit_cooldown_secs
                };
                let mut err = Self::error_for(ErrorKind::RateLimited, error, "Too many requests");
                err.retry_after_secs = Some(cooldown);
                GenerationResult::Error(err)
            }
            401 | 403 => GenerationResult::Error(Self::error_for(
                ErrorKind::AuthFailed,
                error,
                "Z.AI rejected the API key",
            )),
            400 => GenerationResult::Error(Self::error_for(
                ErrorKind::BadRequest,
                error,
                "Z.AI rejected the request",
            )),
            status if (200..300).contains(&status) => {
                let Some(json) = json.as_ref() else {
                    return malformed(Provider::ZaiCogView, "body is not valid JSON");
                };
                if error.is_some() {
                    return GenerationResult::Error(Self::error_for(
                        ErrorKind::ProviderBusinessError,
                        error,
                        "Z.AI reported an error",
                    ));
                }
                match first_image_url(json) {
                    Some(url) => GenerationResult::Image(ImagePayload::Url(url)),
                    None => malformed(Provider::ZaiCogView, "no data[0].url in body"),
                }
            }
            _ => unexpected_status(Provider::ZaiCogView, response, error),
        }
    }

    fn build_key_probe(&self, api_key: &ApiKey) -> Result<HttpRequest> {
        let body = json!({
            "model": PROBE_MODEL,
            "messages": [{ "role": "user", "content": "ping" }],
            "max_tokens": 1,
        });
        authorize(&self.endpoint, HttpRequest::post(self.endpoint.url(CHAT_PATH), body), api_key)
    }

    fn interpret_key_probe(&self, response: &HttpResponse) -> TestOutcome {
        let error = response.json().as_ref().and_then(ErrorBody::from_json);
        if response.is_success() && error.is_none() {
            return TestOutcome::Valid;
        }
        let error = error.as_ref();
        if response.status == 401 || Self::has_code(error, &AUTH_CODES) {
            let err = Self::error_for(ErrorKind::AuthFailed, error, "Z.AI rejected the API key");
            return TestOutcome::Invalid(err.message);
        }
        match error {
            Some(e) => TestOutcome::Invalid(
                Self::error_for(ErrorKind::ProviderBusinessError, Some(e), "unknown error").message,
            ),
            None => TestOutcome::Invalid(format!(
                "Z.AI returned HTTP {}: {}",
                response.status,
                snippet(&response.body)
            )),
        }
    }
}
