//! Vision model provider abstractions and implementations.
//!
//! The analyzer talks to a [`VisionProvider`]; Gemini is the production
//! backend and the mock backs the HTTP tests.

pub mod gemini;
pub mod mock;

use crate::services::credentials::Authorization;
use crate::services::image_decoder::DecodedImage;
use async_trait::async_trait;
use thiserror::Error;

/// Error type for provider operations.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Credentials rejected: {0}")]
    Unauthorized(String),

    /// Carries the full upstream description.
    #[error("{0}")]
    ApiError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Content filtered: {0}")]
    ContentFiltered(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Metric label for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::NotConfigured(_) => "not_configured",
            ProviderError::Unauthorized(_) => "unauthorized",
            ProviderError::ApiError(_) => "api_error",
            ProviderError::RateLimited(_) => "rate_limited",
            ProviderError::ContentFiltered(_) => "content_filtered",
            ProviderError::NetworkError(_) => "network",
            ProviderError::InvalidResponse(_) => "invalid_response",
        }
    }
}

/// Reason why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Complete,
    Length,
    ContentFilter,
    Other,
}

impl FinishReason {
    pub fn from_api(reason: Option<&str>) -> Self {
        match reason {
            None | Some("STOP") => FinishReason::Complete,
            Some("MAX_TOKENS") => FinishReason::Length,
            Some("SAFETY") | Some("RECITATION") | Some("BLOCKLIST") | Some("PROHIBITED_CONTENT") => {
                FinishReason::ContentFilter
            }
            Some(_) => FinishReason::Other,
        }
    }
}

/// Result of a provider call.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub text: String,
    pub input_tokens: i32,
    pub output_tokens: i32,
    pub finish_reason: FinishReason,
}

/// A model that answers a text prompt about one image.
#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// Provider name, used as a metric label.
    fn name(&self) -> &'static str;

    /// Model identifier requests are sent to.
    fn model(&self) -> &str;

    /// Generate text for `prompt` with `image` attached.
    async fn generate(
        &self,
        authorization: &Authorization,
        prompt: &str,
        image: &DecodedImage,
    ) -> Result<ProviderResponse, ProviderError>;

    /// Local configuration check for the readiness endpoint.
    async fn health_check(&self) -> Result<(), ProviderError>;
}
