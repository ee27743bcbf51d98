//! The analyze pipeline: validate, authorize, decode, relay.

use crate::error::AnalyzeError;
use crate::models::{AnalysisResult, AnalyzeRequest};
use crate::services::credentials::CredentialProvider;
use crate::services::image_decoder::decode_image_blocking;
use crate::services::metrics as service_metrics;
use crate::services::providers::{ProviderError, VisionProvider};
use std::sync::Arc;
use std::time::Instant;

pub struct Analyzer {
    credentials: Arc<dyn CredentialProvider>,
    provider: Arc<dyn VisionProvider>,
    default_prompt: String,
    max_upload_bytes: usize,
}

impl Analyzer {
    pub fn new(
        credentials: Arc<dyn CredentialProvider>,
        provider: Arc<dyn VisionProvider>,
        default_prompt: impl Into<String>,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            credentials,
            provider,
            default_prompt: default_prompt.into(),
            max_upload_bytes,
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    pub fn default_prompt(&self) -> &str {
        &self.default_prompt
    }

    /// Run one request through the pipeline.
    pub async fn analyze(&self, request: AnalyzeRequest) -> Result<AnalysisResult, AnalyzeError> {
        let result = self.run(request).await;
        service_metrics::record_analysis(match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        });
        result
    }

    async fn run(&self, request: AnalyzeRequest) -> Result<AnalysisResult, AnalyzeError> {
        let prompt = request.prompt_or(&self.default_prompt).to_string();
        let upload = request.file.ok_or_else(AnalyzeError::missing_file)?;

        if upload.data.len() > self.max_upload_bytes {
            return Err(AnalyzeError::Validation(format!(
                "File too large ({} bytes, max {} bytes)",
                upload.data.len(),
                self.max_upload_bytes
            )));
        }

        let authorization = self.credentials.authorize().await?;

        let image = decode_image_blocking(upload.data).await?;
        tracing::info!(
            file_name = upload.file_name.as_deref().unwrap_or("-"),
            format = ?image.source_format,
            width = image.width,
            height = image.height,
            transcoded = image.was_transcoded(),
            "Image decoded"
        );

        let provider_name = self.provider.name();
        let started = Instant::now();
        let outcome = self
            .provider
            .generate(&authorization, &prompt, &image)
            .await;
        service_metrics::record_provider_latency(
            provider_name,
            self.provider.model(),
            started.elapsed().as_secs_f64(),
        );

        match outcome {
            Ok(response) => {
                service_metrics::record_tokens(
                    self.provider.model(),
                    response.input_tokens,
                    response.output_tokens,
                );
                tracing::info!(
                    model = self.provider.model(),
                    input_tokens = response.input_tokens,
                    output_tokens = response.output_tokens,
                    finish_reason = ?response.finish_reason,
                    "Generation completed"
                );
                Ok(AnalysisResult {
                    generated_text: response.text,
                })
            }
            Err(err) => {
                service_metrics::record_provider_error(provider_name, err.kind());
                Err(match err {
                    ProviderError::Unauthorized(message) if authorization.is_api_key() => {
                        AnalyzeError::Configuration(message)
                    }
                    other => AnalyzeError::Generation(other.to_string()),
                })
            }
        }
    }

    /// Readiness: credentials readable and provider configured.
    pub async fn check_ready(&self) -> Result<(), String> {
        self.credentials
            .check()
            .await
            .map_err(|e| format!("credentials ({}): {}", self.credentials.kind(), e))?;
        self.provider
            .health_check()
            .await
            .map_err(|e| format!("provider ({}): {}", self.provider.name(), e))
    }
}
