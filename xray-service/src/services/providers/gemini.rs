//! Gemini vision provider.
//!
//! Sends one `generateContent` call per analysis with the prompt and the image
//! as inline data, authenticated by API key header or OAuth bearer token.

use super::{FinishReason, ProviderError, ProviderResponse, VisionProvider};
use crate::services::credentials::Authorization;
use crate::services::image_decoder::DecodedImage;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Gemini API base URL.
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini provider configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub model: String,
    pub api_base: String,
    pub timeout: Duration,
}

/// Gemini vision provider.
pub struct GeminiVisionProvider {
    config: GeminiConfig,
    client: Client,
}

impl GeminiVisionProvider {
    pub fn new(config: GeminiConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                ProviderError::NotConfigured(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { config, client })
    }

    /// Build the API URL for the configured model and method.
    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/models/{}:{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.model,
            method
        )
    }

    fn build_request(prompt: &str, image: &DecodedImage) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![
                    RequestPart::Text {
                        text: prompt.to_string(),
                    },
                    RequestPart::InlineData {
                        inline_data: InlineData {
                            mime_type: image.mime_type.to_string(),
                            data: STANDARD.encode(&image.data),
                        },
                    },
                ],
            }],
        }
    }

    fn error_from_status(status: StatusCode, body: &str) -> ProviderError {
        let parsed = serde_json::from_str::<ApiErrorResponse>(body).ok();
        let message = parsed
            .as_ref()
            .map(|e| e.error.message.clone())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| body.to_string());
        let key_invalid = parsed
            .as_ref()
            .is_some_and(|e| e.error.details.iter().any(|d| d.reason.as_deref() == Some("API_KEY_INVALID")));

        match status {
            StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited(message),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Unauthorized(message),
            _ if key_invalid => ProviderError::Unauthorized(message),
            _ => ProviderError::ApiError(format!("Gemini API error {}: {}", status, message)),
        }
    }
}

#[async_trait]
impl VisionProvider for GeminiVisionProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn generate(
        &self,
        authorization: &Authorization,
        prompt: &str,
        image: &DecodedImage,
    ) -> Result<ProviderResponse, ProviderError> {
        let request = Self::build_request(prompt, image);
        let url = self.api_url("generateContent");

        tracing::debug!(
            model = %self.config.model,
            prompt_len = prompt.len(),
            image_bytes = image.data.len(),
            mime_type = image.mime_type,
            auth = authorization.scheme(),
            "Sending request to Gemini API"
        );

        let builder = self.client.post(&url).json(&request);
        let builder = match authorization {
            Authorization::Bearer(token) => builder.bearer_auth(token.expose()),
            Authorization::ApiKey(key) => builder.header(API_KEY_HEADER, key.expose_secret()),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(Self::error_from_status(status, &error_text));
        }

        let api_response: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        let usage = api_response.usage_metadata.unwrap_or_default();

        let Some(candidate) = api_response.candidates.into_iter().next() else {
            let reason = api_response
                .prompt_feedback
                .and_then(|f| f.block_reason);
            return Err(match reason {
                Some(reason) => ProviderError::ContentFiltered(format!("prompt blocked: {}", reason)),
                None => ProviderError::InvalidResponse("response contained no candidates".to_string()),
            });
        };

        let finish_reason = FinishReason::from_api(candidate.finish_reason.as_deref());

        let text: String = candidate
            .content
            .map(|c| c.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|p| p.text)
            .collect();

        if text.is_empty() {
            let reason = candidate.finish_reason.unwrap_or_else(|| "UNSPECIFIED".to_string());
            return Err(if finish_reason == FinishReason::ContentFilter {
                ProviderError::ContentFiltered(format!("finish reason {}", reason))
            } else {
                ProviderError::InvalidResponse(format!(
                    "response contained no text (finish reason {})",
                    reason
                ))
            });
        }

        Ok(ProviderResponse {
            text,
            input_tokens: usage.prompt_token_count.unwrap_or(0),
            output_tokens: usage.candidates_token_count.unwrap_or(0),
            finish_reason,
        })
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        if self.config.model.trim().is_empty() {
            return Err(ProviderError::NotConfigured(
                "Gemini model not configured".to_string(),
            ));
        }
        reqwest::Url::parse(&self.api_url("generateContent"))
            .map(|_| ())
            .map_err(|e| ProviderError::NotConfigured(format!("Invalid Gemini API base: {}", e)))
    }
}

// ============================================================================
// Gemini API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    role: &'static str,
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<i32>,
    candidates_token_count: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Vec<ApiErrorInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorInfo {
    #[serde(default)]
    reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageFormat;

    fn provider(api_base: &str) -> GeminiVisionProvider {
        GeminiVisionProvider::new(GeminiConfig {
            model: "gemini-1.5-pro-latest".to_string(),
            api_base: api_base.to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn api_url_tolerates_trailing_slash() {
        assert_eq!(
            provider("https://example.test/v1beta/").api_url("generateContent"),
            "https://example.test/v1beta/models/gemini-1.5-pro-latest:generateContent"
        );
    }

    #[test]
    fn request_carries_prompt_then_inline_image() {
        let image = DecodedImage {
            source_format: ImageFormat::Png,
            width: 1,
            height: 1,
            mime_type: "image/png",
            data: vec![1, 2, 3],
        };
        let request = GeminiVisionProvider::build_request("Describe this", &image);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "Describe this");
        assert_eq!(
            json["contents"][0]["parts"][1]["inlineData"]["mimeType"],
            "image/png"
        );
        assert_eq!(json["contents"][0]["parts"][1]["inlineData"]["data"], "AQID");
    }

    #[test]
    fn invalid_key_reason_maps_to_unauthorized() {
        let body = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT","details":[{"@type":"type.googleapis.com/google.rpc.ErrorInfo","reason":"API_KEY_INVALID"}]}}"#;
        let err = GeminiVisionProvider::error_from_status(StatusCode::BAD_REQUEST, body);
        assert!(matches!(err, ProviderError::Unauthorized(ref m) if m.starts_with("API key not valid")));
    }

    #[test]
    fn unparseable_error_body_is_kept_verbatim() {
        let err = GeminiVisionProvider::error_from_status(StatusCode::BAD_GATEWAY, "upstream hiccup");
        assert_eq!(
            err.to_string(),
            "Gemini API error 502 Bad Gateway: upstream hiccup"
        );
    }

    #[tokio::test]
    async fn health_check_rejects_blank_model() {
        let mut p = provider(GEMINI_API_BASE);
        assert!(p.health_check().await.is_ok());
        p.config.model = " ".to_string();
        assert!(p.health_check().await.is_err());
    }
}
