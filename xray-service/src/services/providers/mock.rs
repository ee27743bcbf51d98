//! Mock provider implementation for testing.

use super::{FinishReason, ProviderError, ProviderResponse, VisionProvider};
use crate::services::credentials::Authorization;
use crate::services::image_decoder::DecodedImage;
use async_trait::async_trait;
use tokio::sync::Mutex;

/// One call observed by [`MockVisionProvider`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub prompt: String,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    pub auth_scheme: &'static str,
}

enum Outcome {
    Text(String),
    Fail(ProviderError),
}

/// Mock vision provider that returns a canned answer and records its calls.
pub struct MockVisionProvider {
    enabled: bool,
    outcome: Outcome,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockVisionProvider {
    pub fn succeeding(text: impl Into<String>) -> Self {
        Self {
            enabled: true,
            outcome: Outcome::Text(text.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: ProviderError) -> Self {
        Self {
            enabled: true,
            outcome: Outcome::Fail(error),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A provider whose health check fails.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            outcome: Outcome::Fail(ProviderError::NotConfigured(
                "Mock vision provider not enabled".to_string(),
            )),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl VisionProvider for MockVisionProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-vision"
    }

    async fn generate(
        &self,
        authorization: &Authorization,
        prompt: &str,
        image: &DecodedImage,
    ) -> Result<ProviderResponse, ProviderError> {
        self.calls.lock().await.push(RecordedCall {
            prompt: prompt.to_string(),
            mime_type: image.mime_type.to_string(),
            width: image.width,
            height: image.height,
            auth_scheme: authorization.scheme(),
        });

        match &self.outcome {
            Outcome::Text(text) => Ok(ProviderResponse {
                text: text.clone(),
                input_tokens: prompt.len() as i32 / 4,
                output_tokens: text.len() as i32 / 4,
                finish_reason: FinishReason::Complete,
            }),
            Outcome::Fail(error) => Err(error.clone()),
        }
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        if self.enabled {
            Ok(())
        } else {
            Err(ProviderError::NotConfigured(
                "Mock vision provider not enabled".to_string(),
            ))
        }
    }
}
