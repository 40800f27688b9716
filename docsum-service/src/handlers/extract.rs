use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::ExtractTextResponse,
    middleware::AuthUser,
    models::NewDocument,
    services::{metrics, ExtractError},
    AppState,
};

const DEFAULT_MIME: &str = "application/octet-stream";

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(e.body_text())
    } else {
        AppError::BadRequest(anyhow::anyhow!("Failed to read multipart body: {}", e))
    }
}

/// Drop parameters such as `; charset=utf-8` and normalise case.
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or(DEFAULT_MIME)
        .trim()
        .to_ascii_lowercase()
}

struct Upload {
    file_name: String,
    mime_type: String,
    bytes: Vec<u8>,
}

/// Read the `file` field, stopping as soon as it exceeds `max_bytes`.
async fn read_upload(multipart: &mut Multipart, max_bytes: usize) -> Result<Upload, AppError> {
    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("unnamed").to_string();
        let mime_type = essence(field.content_type().unwrap_or(DEFAULT_MIME));

        let mut bytes = Vec::new();
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            if bytes.len() + chunk.len() > max_bytes {
                drop(bytes);
                // Discard the rest so the client reads the 413 instead of a reset.
                while let Ok(Some(_)) = field.chunk().await {}
                return Err(AppError::PayloadTooLarge(format!(
                    "File exceeds the {} byte limit",
                    max_bytes
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        return Ok(Upload {
            file_name,
            mime_type,
            bytes,
        });
    }

    Err(AppError::BadRequest(anyhow::anyhow!("No file uploaded")))
}

pub async fn extract_text(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<Json<ExtractTextResponse>, AppError> {
    let upload = read_upload(&mut multipart, state.config.upload.max_upload_bytes)
        .await
        .map_err(|e| {
            if let AppError::PayloadTooLarge(_) = e {
                metrics::record_extraction_failure("too_large");
            }
            tracing::warn!(user_id = %user.user_id, error = %e, "Rejected upload");
            e
        })?;

    let Upload {
        file_name,
        mime_type,
        bytes,
    } = upload;
    let file_size = bytes.len() as i64;

    tracing::info!(
        user_id = %user.user_id,
        file_name = %file_name,
        mime_type = %mime_type,
        file_size,
        "Extracting text from upload"
    );

    let registry = state.extractors.clone();
    let (name, mime) = (file_name.clone(), mime_type.clone());
    let extraction = tokio::task::spawn_blocking(move || registry.extract_text(&bytes, &name, &mime))
        .await
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Extraction task failed: {}", e)))?
        .map_err(|e| match e {
            ExtractError::Unsupported(mime) => {
                metrics::record_extraction_failure("unsupported");
                tracing::warn!(mime_type = %mime, "Unsupported file type");
                AppError::UnsupportedMediaType(mime)
            }
            failed @ ExtractError::Failed { .. } => {
                metrics::record_extraction_failure("failed");
                tracing::warn!(error = %failed, "Text extraction failed");
                AppError::BadRequest(anyhow::anyhow!("Failed to extract text from file"))
            }
        })?;

    let document = state
        .repo
        .create_document(NewDocument {
            user_id: user.user_id.clone(),
            file_name,
            file_type: mime_type,
            file_size,
        })
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to save document");
            e
        })?;

    metrics::record_document_uploaded(extraction.extractor);
    tracing::info!(
        document_id = %document.id,
        extractor = extraction.extractor,
        text_len = extraction.text.len(),
        "Document created"
    );

    Ok(Json(ExtractTextResponse {
        text: extraction.text,
        document,
    }))
}
