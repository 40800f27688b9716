use axum::{
    extract::{rejection::PathRejection, Path, State},
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{dtos::DocumentResponse, middleware::AuthUser, AppState};

pub async fn list_documents(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<DocumentResponse>>, AppError> {
    let documents = state.repo.list_documents(&user.user_id).await?;

    tracing::debug!(user_id = %user.user_id, count = documents.len(), "Listed documents");

    Ok(Json(documents.into_iter().map(DocumentResponse::from).collect()))
}

/// Documents owned by someone else are reported exactly like missing ones.
pub async fn get_document(
    State(state): State<AppState>,
    user: AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<DocumentResponse>, AppError> {
    let Path(id) = id.map_err(|_| AppError::NotFound(anyhow::anyhow!("Document not found")))?;

    let document = state
        .repo
        .get_document(&user.user_id, id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Document not found")))?;

    Ok(Json(document.into()))
}
