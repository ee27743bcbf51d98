use crate::services::credentials::CredentialError;
use crate::services::image_decoder::ImageDecodeError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Message returned when the form has no `file` part.
pub const MISSING_FILE_MESSAGE: &str = "No image file provided";

/// Failures of the analyze pipeline, one variant per stage.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("{0}")]
    Validation(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Failed to configure Gemini API: {0}")]
    Configuration(String),

    #[error("Failed to open image: {0}")]
    ImageDecode(#[from] ImageDecodeError),

    #[error("Failed to generate content: {0}")]
    Generation(String),
}

impl AnalyzeError {
    pub fn missing_file() -> Self {
        AnalyzeError::Validation(MISSING_FILE_MESSAGE.to_string())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AnalyzeError::Validation(_) => StatusCode::BAD_REQUEST,
            AnalyzeError::Authentication(_)
            | AnalyzeError::Configuration(_)
            | AnalyzeError::ImageDecode(_)
            | AnalyzeError::Generation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Metric label for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalyzeError::Validation(_) => "validation",
            AnalyzeError::Authentication(_) => "authentication",
            AnalyzeError::Configuration(_) => "configuration",
            AnalyzeError::ImageDecode(_) => "image_decode",
            AnalyzeError::Generation(_) => "generation",
        }
    }
}

impl From<CredentialError> for AnalyzeError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::MissingApiKey => AnalyzeError::Configuration(err.to_string()),
            other => AnalyzeError::Authentication(other.to_string()),
        }
    }
}

impl IntoResponse for AnalyzeError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
        }

        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "Analyze request failed");
        } else {
            tracing::warn!(kind = self.kind(), error = %self, "Analyze request rejected");
        }

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
