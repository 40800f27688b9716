pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Request},
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use service_core::middleware::{
    metrics::metrics_middleware,
    security_headers::security_headers_middleware,
    tracing::{make_request_span, request_id_middleware},
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use config::DocsumConfig;
use services::{
    providers::GenerationParams, DocumentRepository, ExtractorRegistry, SessionVerifier,
    StripeClient, SummaryProvider,
};

/// Multipart framing allowance on top of the file size limit.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<DocsumConfig>,
    pub repo: Arc<dyn DocumentRepository>,
    pub extractors: ExtractorRegistry,
    pub provider: Arc<dyn SummaryProvider>,
    pub stripe: StripeClient,
    pub sessions: SessionVerifier,
}

impl AppState {
    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            model: self.config.llm.model.clone(),
            temperature: self.config.llm.temperature,
            max_tokens: self.config.llm.max_tokens,
        }
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}. Skipping.", o, e);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.upload.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    let protected = Router::new()
        .route("/api/extract-text", post(handlers::extract_text))
        .route("/api/summarize", post(handlers::summarize))
        .route("/api/documents", get(handlers::list_documents))
        .route("/api/documents/:id", get(handlers::get_document))
        .route("/api/subscription", get(handlers::get_subscription))
        .route("/api/stripe/create-checkout", post(handlers::create_checkout))
        .route("/api/stripe/billing-portal", post(handlers::billing_portal))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let public = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route("/api/stripe/webhook", post(handlers::stripe_webhook));

    let cors = cors_layer(&state.config.allowed_origins);

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<Body>| make_request_span(request)),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors)
        .with_state(state)
}
