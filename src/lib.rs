//! Image Studio: prompt-to-image requests against OpenAI DALL-E 3, Google
//! Gemini Imagen and Z.AI CogView-4 using a caller-supplied key.
//!
//! [`GenerationController`] is the entry point. It picks the provider adapter,
//! sends exactly one request, classifies the answer into a
//! [`GenerationResult`], and gates further submissions with a cooldown.

pub mod config;
pub mod controller;
pub mod error;
pub mod logger;
pub mod models;
pub mod providers;
pub mod throttle;
pub mod transport;

pub use config::{AuthScheme, ProviderEndpoint, StudioConfig};
pub use controller::GenerationController;
pub use error::{Result, StudioError};
pub use models::{
    ApiKey, ErrorKind, GenerationError, GenerationRequest, GenerationResult, ImagePayload,
    Provider, Quality, TestOutcome,
};
pub use providers::{GeminiAdapter, OpenAiAdapter, ProviderAdapter, ZaiAdapter};
pub use throttle::{Phase, ThrottleState};
pub use transport::{HttpMethod, HttpRequest, HttpResponse, ReqwestTransport, Transport};
