//! Streaming summarization.
//!
//! The response is an SSE stream of `token` events, ending with either one
//! `done` event (summary persisted) or one `error` event (nothing persisted).

use axum::{
    extract::{rejection::JsonRejection, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{Stream, StreamExt};
use serde_json::json;
use service_core::error::AppError;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use validator::Validate;

use crate::{
    dtos::{SummarizeRequest, SummaryDoneEvent},
    middleware::AuthUser,
    services::{
        metrics,
        providers::{build_conversation, ProviderError, StreamChunk},
    },
    AppState,
};

pub const EVENT_TOKEN: &str = "token";
pub const EVENT_DONE: &str = "done";
pub const EVENT_ERROR: &str = "error";

fn error_event(message: &str) -> Event {
    Event::default()
        .event(EVENT_ERROR)
        .data(json!({ "error": message }).to_string())
}

fn provider_error(e: ProviderError) -> AppError {
    match e {
        ProviderError::NotConfigured(msg) => {
            AppError::ServiceUnavailable(format!("Summarization unavailable: {}", msg))
        }
        other => AppError::BadGateway(other.to_string()),
    }
}

pub async fn summarize(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<SummarizeRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let Json(request) =
        payload.map_err(|e| AppError::BadRequest(anyhow::anyhow!(e.body_text())))?;
    request.validate()?;

    let document_id = request.document_id;

    // A summary may only be produced for a document the caller owns.
    state
        .repo
        .get_document(&user.user_id, document_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Document not found")))?;

    let conversation = build_conversation(request.conversation());
    let provider_name = state.provider.name();

    tracing::info!(
        user_id = %user.user_id,
        document_id = %document_id,
        provider = provider_name,
        message_count = conversation.len(),
        "Starting summarization"
    );

    let mut upstream = state
        .provider
        .stream_summary(&conversation, &state.generation_params())
        .await
        .map_err(|e| {
            metrics::record_summarization_failure(provider_name, e.kind());
            tracing::error!(error = %e, "Summarization request failed");
            provider_error(e)
        })?;

    let (tx, rx) = mpsc::channel::<Event>(32);
    let repo = state.repo.clone();
    let user_id = user.user_id;

    tokio::spawn(async move {
        let mut content = String::new();

        while let Some(item) = upstream.next().await {
            match item {
                Ok(StreamChunk::Token(token)) => {
                    content.push_str(&token);
                    let event = Event::default()
                        .event(EVENT_TOKEN)
                        .data(json!({ "content": token }).to_string());
                    if tx.send(event).await.is_err() {
                        tracing::info!(document_id = %document_id, "Client disconnected mid-stream");
                        return;
                    }
                }
                Ok(StreamChunk::Complete) => {
                    match repo.create_summary(&user_id, document_id, content).await {
                        Ok(summary) => {
                            metrics::record_summary_created(provider_name);
                            tracing::info!(
                                summary_id = %summary.id,
                                document_id = %document_id,
                                "Summary saved"
                            );
                            let done = SummaryDoneEvent {
                                summary_id: summary.id,
                                document_id,
                            };
                            let event = Event::default()
                                .event(EVENT_DONE)
                                .data(json!(done).to_string());
                            let _ = tx.send(event).await;
                        }
                        Err(e) => {
                            metrics::record_summarization_failure(provider_name, "persist");
                            tracing::error!(error = %e, "Failed to save summary");
                            let _ = tx.send(error_event("Failed to save summary")).await;
                        }
                    }
                    return;
                }
                Err(e) => {
                    metrics::record_summarization_failure(provider_name, e.kind());
                    tracing::error!(error = %e, "Summarization stream failed");
                    let _ = tx.send(error_event(&e.to_string())).await;
                    return;
                }
            }
        }

        metrics::record_summarization_failure(provider_name, "incomplete");
        tracing::error!(document_id = %document_id, "Provider stream ended without completion");
        let _ = tx
            .send(error_event("Summarization ended before completion"))
            .await;
    });

    let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
