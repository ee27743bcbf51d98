use crate::error::AnalyzeError;
use crate::models::{AnalysisResult, AnalyzeRequest, ImageUpload};
use crate::startup::AppState;
use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};

/// `POST /analyze`: multipart `file` (image) and optional `text` prompt.
pub async fn analyze_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AnalysisResult>, AnalyzeError> {
    // A body that is not multipart cannot carry a file.
    let multipart = multipart.map_err(|rejection| {
        tracing::warn!(%rejection, "Analyze request is not a multipart form");
        AnalyzeError::missing_file()
    })?;

    let request = read_form(multipart).await?;

    if let Some(file) = &request.file {
        tracing::info!(
            file_name = file.file_name.as_deref().unwrap_or("-"),
            content_type = file.content_type.as_deref().unwrap_or("-"),
            size = file.data.len(),
            custom_prompt = request.text.as_deref().is_some_and(|t| !t.trim().is_empty()),
            "Image upload received"
        );
    }

    let result = state.analyzer.analyze(request).await?;
    Ok(Json(result))
}

async fn read_form(mut multipart: Multipart) -> Result<AnalyzeRequest, AnalyzeError> {
    let mut request = AnalyzeRequest::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        AnalyzeError::Validation(format!("Failed to read multipart form: {}", e))
    })? {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "file" if request.file.is_none() => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(|e| {
                    AnalyzeError::Validation(format!("Failed to read file bytes: {}", e))
                })?;

                request.file = Some(ImageUpload {
                    file_name,
                    content_type,
                    data,
                });
            }
            "text" => {
                let text = field.text().await.map_err(|e| {
                    AnalyzeError::Validation(format!("Failed to read text field: {}", e))
                })?;
                request.text = Some(text);
            }
            _ => {
                tracing::debug!(field = %name, "Ignoring form field");
            }
        }
    }

    Ok(request)
}
