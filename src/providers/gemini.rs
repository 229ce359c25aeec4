use super::{authorize, malformed, snippet, unexpected_status, ErrorBody, ProviderAdapter};
use crate::{
    config::ProviderEndpoint,
    error::Result,
    models::{
        ApiKey, ErrorKind, GenerationError, GenerationRequest, GenerationResult, ImagePayload,
        Provider, TestOutcome,
    },
    transport::{HttpRequest, HttpResponse},
};
use serde_json::{json, Value};
use uuid::Uuid;

const GENERATE_PATH: &str = "v1beta/models/imagen-3.0-generate-001:generateContent";
const MODELS_PATH: &str = "v1beta/models";
const TEMPERATURE: f32 = 1.0;

/// Finish reasons that mean the candidate was withheld for safety.
const BLOCKED_FINISH_REASONS: [&str; 5] = [
    "SAFETY",
    "IMAGE_SAFETY",
    "PROHIBITED_CONTENT",
    "BLOCKLIST",
    "SPII",
];

#[derive(Debug, Clone)]
pub struct GeminiAdapter {
    endpoint: ProviderEndpoint,
}

impl GeminiAdapter {
    pub fn new(endpoint: ProviderEndpoint) -> Self {
        Self { endpoint }
    }

    fn is_invalid_key(error: &ErrorBody) -> bool {
        error.has_reason("API_KEY_INVALID")
            || error
                .message
                .as_deref()
                .is_some_and(|m| m.contains("API key not valid"))
    }

    fn content_block(json: &Value) -> Option<String> {
        if let Some(reason) = json["promptFeedback"]["blockReason"].as_str() {
            return Some(format!("The prompt was blocked by Gemini safety filters ({})", reason));
        }
        let finish = json["candidates"][0]["finishReason"].as_str()?;
        BLOCKED_FINISH_REASONS
            .contains(&finish)
            .then(|| format!("The image was withheld by Gemini safety filters ({})", finish))
    }

    fn inline_image(json: &Value) -> Option<ImagePayload> {
        json["candidates"][0]["content"]["parts"]
            .as_array()?
            .iter()
            .find_map(|part| {
                let inline = part.get("inlineData")?;
                let data = inline.get("data")?.as_str().filter(|d| !d.is_empty())?;
                let mime_type = inline
                    .get("mimeType")
                    .and_then(Value::as_str)
                    .unwrap_or("image/png");
                Some(ImagePayload::Inline {
                    mime_type: mime_type.to_string(),
                    data: data.to_string(),
                })
            })
    }

    fn text_parts(json: &Value) -> String {
        json["candidates"][0]["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p["text"].as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default()
    }
}

fn random_seed() -> u32 {
    (Uuid::new_v4().as_u128() % 1_000_000) as u32
}

impl ProviderAdapter for GeminiAdapter {
    fn provider(&self) -> Provider {
        Provider::GeminiImagen
    }

    fn endpoint(&self) -> &ProviderEndpoint {
        &self.endpoint
    }

    fn build_request(&self, request: &GenerationRequest) -> Result<HttpRequest> {
        let body = json!({
            "contents": [{
                "parts": [{ "text": request.prompt }]
            }],
            "generationConfig": {
                "responseModalities": ["IMAGE", "TEXT"],
                "temperature": TEMPERATURE,
                "seed": request.seed.unwrap_or_else(random_seed),
            }
        });

        authorize(
            &self.endpoint,
            HttpRequest::post(self.endpoint.url(GENERATE_PATH), body),
            &request.api_key,
        )
    }

    fn parse_response(&self, response: &HttpResponse) -> GenerationResult {
        let json = response.json();
        let error = json.as_ref().and_then(ErrorBody::from_json);
        let message = |fallback: &str| {
            error
                .as_ref()
                .map(|e| e.message_or(fallback))
                .unwrap_or_else(|| fallback.to_string())
        };

        let classified = match response.status {
            429 => GenerationError::rate_limited(
                message("Gemini quota exhausted, wait before retrying"),
                self.endpoint.rate_limit_cooldown_secs,
            ),
            401 | 403 => GenerationError::new(
                ErrorKind::AuthFailed,
                message("Gemini rejected the API key"),
            ),
            400 if error.as_ref().is_some_and(Self::is_invalid_key) => GenerationError::new(
                ErrorKind::AuthFailed,
                "Invalid Gemini API key. Check the key and try again.",
            ),
            400 => GenerationError::new(
                ErrorKind::BadRequest,
                message("Gemini rejected the request"),
            ),
            status if (200..300).contains(&status) => {
                let Some(json) = json.as_ref() else {
                    return malformed(Provider::GeminiImagen, "body is not valid JSON");
                };
                if let Some(error) = &error {
                    GenerationError::new(
                        ErrorKind::ProviderBusinessError,
                        error.message_or("Gemini reported an error"),
                    )
                } else if let Some(reason) = Self::content_block(json) {
                    GenerationError::new(ErrorKind::ContentPolicy, reason)
                } else if let Some(image) = Self::inline_image(json) {
                    return GenerationResult::Image(image);
                } else {
                    let text = Self::text_parts(json);
                    return if text.is_empty() {
                        malformed(Provider::GeminiImagen, "no inlineData part in candidates")
                    } else {
                        malformed(
                            Provider::GeminiImagen,
                            format!("model answered with text only: {}", snippet(&text)),
                        )
                    };
                }
            }
            _ => return unexpected_status(Provider::GeminiImagen, response, error.as_ref()),
        };

        let code = error.and_then(|e| e.status.or(e.code));
        GenerationResult::Error(match code {
            Some(code) => classified.with_code(code),
            None => classified,
        })
    }

    fn build_key_probe(&self, api_key: &ApiKey) -> Result<HttpRequest> {
        authorize(&self.endpoint, HttpRequest::get(self.endpoint.url(MODELS_PATH)), api_key)
    }

    fn interpret_key_probe(&self, response: &HttpResponse) -> TestOutcome {
        if response.is_success() {
            return TestOutcome::Valid;
        }
        let error = response.json().as_ref().and_then(ErrorBody::from_json);
        match error {
            Some(e) if Self::is_invalid_key(&e) => {
                TestOutcome::Invalid("Invalid Gemini API key".to_string())
            }
            Some(e) => TestOutcome::Invalid(format!(
                "Gemini returned HTTP {}: {}",
                response.status,
                e.message_or("unknown error")
            )),
            None => TestOutcome::Invalid(format!(
                "Gemini returned HTTP {}: {}",
                response.status,
                snippet(&response.body)
            )),
        }
    }
}
