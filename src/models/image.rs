use super::common::{ApiKey, Provider, Quality};
use crate::error::Result;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use std::fmt;

/// One user submission. Immutable once handed to the controller.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub api_key: ApiKey,
    pub provider: Provider,
    pub quality: Quality,
    /// Only used by Gemini; a random seed is drawn when absent.
    pub seed: Option<u32>,
}

impl GenerationRequest {
    pub fn new(provider: Provider, prompt: impl Into<String>, api_key: impl Into<ApiKey>) -> Self {
        Self {
            prompt: prompt.into(),
            api_key: api_key.into(),
            provider,
            quality: Quality::Standard,
            seed: None,
        }
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = Some(seed);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImagePayload {
    Url(String),
    Inline { mime_type: String, data: String },
}

impl ImagePayload {
    pub fn decode(&self) -> Result<Option<Vec<u8>>> {
        match self {
            ImagePayload::Url(_) => Ok(None),
            ImagePayload::Inline { data, .. } => Ok(Some(STANDARD.decode(data.trim())?)),
        }
    }

    pub fn data_url(&self) -> String {
        match self {
            ImagePayload::Url(url) => url.clone(),
            ImagePayload::Inline { mime_type, data } => {
                format!("data:{};base64,{}", mime_type, data)
            }
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self {
            ImagePayload::Url(_) => "png",
            ImagePayload::Inline { mime_type, .. } => match mime_type.as_str() {
                "image/jpeg" | "image/jpg" => "jpg",
                "image/webp" => "webp",
                "image/gif" => "gif",
                _ => "png",
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Throttled,
    RateLimited,
    AuthFailed,
    BadRequest,
    ContentPolicy,
    ProviderBusinessError,
    MalformedResponse,
    Network,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Throttled => "throttled",
            ErrorKind::RateLimited => "rate limited",
            ErrorKind::AuthFailed => "authentication failed",
            ErrorKind::BadRequest => "bad request",
            ErrorKind::ContentPolicy => "content policy",
            ErrorKind::ProviderBusinessError => "provider error",
            ErrorKind::MalformedResponse => "malformed response",
            ErrorKind::Network => "network error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationError {
    pub kind: ErrorKind,
    pub message: String,
    /// Provider business code or error status, when one was reported.
    pub code: Option<String>,
    /// Cooldown requested by a rate-limit classification.
    pub retry_after_secs: Option<u64>,
}

impl GenerationError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
            retry_after_secs: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn rate_limited(message: impl Into<String>, retry_after_secs: u64) -> Self {
        Self {
            retry_after_secs: Some(retry_after_secs),
            ..Self::new(ErrorKind::RateLimited, message)
        }
    }
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({}): {}", self.kind.as_str(), code, self.message),
            None => write!(f, "{}: {}", self.kind.as_str(), self.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationResult {
    Image(ImagePayload),
    Error(GenerationError),
}

impl GenerationResult {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        GenerationResult::Error(GenerationError::new(kind, message))
    }

    pub fn is_image(&self) -> bool {
        matches!(self, GenerationResult::Image(_))
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            GenerationResult::Image(_) => None,
            GenerationResult::Error(e) => Some(e.kind),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestOutcome {
    Valid,
    Invalid(String),
    NotApplicable,
}
