use super::{
    authorize, first_image_url, malformed, unexpected_status, ErrorBody, ProviderAdapter,
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

const GENERATIONS_PATH: &str = "v1/images/generations";
const MODELS_PATH: &str = "v1/models";

/// DALL-E 3 over the OpenAI images API.
#[derive(Debug, Clone)]
pub struct OpenAiAdapter {
    endpoint: ProviderEndpoint,
}

impl OpenAiAdapter {
    pub fn new(endpoint: ProviderEndpoint) -> Self {
        Self { endpoint }
    }

    fn auth_message(error: Option<&ErrorBody>) -> String {
        match error.and_then(|e| e.code.as_deref()) {
            Some("invalid_api_key") => {
                "Invalid OpenAI API key. Check the key and try again.".to_string()
            }
            _ => error
                .map(|e| e.message_or("OpenAI rejected the API key"))
                .unwrap_or_else(|| "OpenAI rejected the API key".to_string()),
        }
    }

    fn is_policy(error: Option<&ErrorBody>) -> bool {
        error.and_then(|e| e.code.as_deref()) == Some("content_policy_violation")
    }
}

impl ProviderAdapter for OpenAiAdapter {
    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    fn endpoint(&self) -> &ProviderEndpoint {
        &self.endpoint
    }

    fn build_request(&self, request: &GenerationRequest) -> Result<HttpRequest> {
        let body = json!({
            "model": Provider::OpenAi.model(),
            "prompt": request.prompt,
            "n": 1,
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

        match response.status {
            429 => {
                let quota =
                    error.as_ref().and_then(|e| e.code.as_deref()) == Some("insufficient_quota");
                let (message, cooldown) = if quota {
                    (
                        "You exceeded your current OpenAI quota. Check your plan and billing details."
                            .to_string(),
                        DAILY_QUOTA_COOLDOWN_SECS,
                    )
                } else {
                    (
                        error
                            .as_ref()
                            .map(|e| e.message_or("Too many requests"))
                            .unwrap_or_else(|| "Too many requests".to_string()),
                        self.endpoint.rate_limit_cooldown_secs,
                    )
                };
                let mut err = GenerationError::rate_limited(message, cooldown);
                err.code = error.and_then(|e| e.code);
                GenerationResult::Error(err)
            }
            401 | 403 => {
                let mut err =
                    GenerationError::new(ErrorKind::AuthFailed, Self::auth_message(error.as_ref()));
                err.code = error.and_then(|e| e.code);
                GenerationResult::Error(err)
            }
            400 => {
                let kind = if Self::is_policy(error.as_ref()) {
                    ErrorKind::ContentPolicy
                } else {
                    ErrorKind::BadRequest
                };
                let message = error
                    .as_ref()
                    .map(|e| e.message_or("OpenAI rejected the request"))
                    .unwrap_or_else(|| "OpenAI rejected the request".to_string());
                let mut err = GenerationError::new(kind, message);
                err.code = error.and_then(|e| e.code);
                GenerationResult::Error(err)
            }
            status if (200..300).contains(&status) => {
                let Some(json) = json else {
                    return malformed(Provider::OpenAi, "body is not valid JSON");
                };
                if let Some(error) = error {
                    let kind = if Self::is_policy(Some(&error)) {
                        ErrorKind::ContentPolicy
                    } else {
                        ErrorKind::ProviderBusinessError
                    };
                    let mut err =
                        GenerationError::new(kind, error.message_or("OpenAI reported an error"));
                    err.code = error.code;
                    return GenerationResult::Error(err);
                }
                if let Some(url) = first_image_url(&json) {
                    return GenerationResult::Image(ImagePayload::Url(url));
                }
                match json["data"][0]["b64_json"].as_str() {
                    Some(data) if !data.is_empty() => GenerationResult::Image(ImagePayload::Inline {
                        mime_type: "image/png".to_string(),
                        data: data.to_string(),
                    }),
                    _ => malformed(Provider::OpenAi, "no data[0].url in body"),
                }
            }
            _ => unexpected_status(Provider::OpenAi, response, error.as_ref()),
        }
    }

    fn build_key_probe(&self, api_key: &ApiKey) -> Result<HttpRequest> {
        authorize(&self.endpoint, HttpRequest::get(self.endpoint.url(MODELS_PATH)), api_key)
    }

    fn interpret_key_probe(&self, response: &HttpResponse) -> TestOutcome {
        if response.is_success() {
            return TestOutcome::Valid;
        }
        let error = response.json().as_ref().and_then(ErrorBody::from_json);
        match response.status {
            401 | 403 => TestOutcome::Invalid(Self::auth_message(error.as_ref())),
            status => TestOutcome::Invalid(format!(
                "OpenAI returned HTTP {}: {}",
                status,
                error
                    .map(|e| e.message_or("unknown error"))
                    .unwrap_or_else(|| super::snippet(&response.body))
            )),
        }
    }
}
