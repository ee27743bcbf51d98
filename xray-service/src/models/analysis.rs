use axum::body::Bytes;
use serde::{Deserialize, Serialize};

/// Prompt used when the client sends no `text` field, or an empty one.
pub const DEFAULT_PROMPT: &str = "You are an orthopedic surgeon, check if the X-ray has any issues.";

/// The `file` part of an analyze request.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Parsed multipart form of `POST /analyze`.
#[derive(Debug, Clone, Default)]
pub struct AnalyzeRequest {
    pub file: Option<ImageUpload>,
    pub text: Option<String>,
}

impl AnalyzeRequest {
    /// The client's prompt, or `default` when it is absent or blank.
    pub fn prompt_or<'a>(&'a self, default: &'a str) -> &'a str {
        match self.text.as_deref() {
            Some(text) if !text.trim().is_empty() => text,
            _ => default,
        }
    }
}

/// Successful response body of `POST /analyze`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub generated_text: String,
}
