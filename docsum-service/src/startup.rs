//! Application startup and lifecycle management.

use crate::config::{DatabaseBackend, DocsumConfig, LlmProviderKind};
use crate::services::{
    create_pool, run_migrations, DocumentRepository, ExtractorRegistry, InMemoryRepository,
    MockProvider, OpenAiProvider, PgRepository, SessionVerifier, StripeClient, SummaryProvider,
};
use crate::{build_router, AppState};
use axum::Router;
use service_core::error::AppError;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

async fn build_repository(config: &DocsumConfig) -> Result<Arc<dyn DocumentRepository>, AppError> {
    match config.database.backend {
        DatabaseBackend::Postgres => {
            let pool = create_pool(&config.database).await?;
            run_migrations(&pool).await?;
            Ok(Arc::new(PgRepository::new(pool)))
        }
        DatabaseBackend::Memory => {
            tracing::warn!("Using in-memory document store; data is lost on restart");
            Ok(Arc::new(InMemoryRepository::new()))
        }
    }
}

fn build_provider(config: &DocsumConfig) -> Result<Arc<dyn SummaryProvider>, AppError> {
    match config.llm.provider {
        LlmProviderKind::OpenAi => {
            let provider = OpenAiProvider::new(&config.llm)
                .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?;
            if !provider.is_configured() {
                tracing::warn!("OPENAI_API_KEY not set - summarization will be unavailable");
            }
            Ok(Arc::new(provider))
        }
        LlmProviderKind::Mock => {
            tracing::warn!("Using mock summary provider");
            Ok(Arc::new(MockProvider::default()))
        }
    }
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: DocsumConfig) -> Result<Self, AppError> {
        let repo = build_repository(&config).await?;
        let state = Self::state(config, repo)?;
        Self::from_state(state).await
    }

    /// Assemble shared state around an existing repository.
    pub fn state(
        config: DocsumConfig,
        repo: Arc<dyn DocumentRepository>,
    ) -> Result<AppState, AppError> {
        let sessions = SessionVerifier::new(&config.auth).map_err(AppError::ConfigError)?;
        let provider = build_provider(&config)?;

        let stripe = StripeClient::new(config.stripe.clone());
        if stripe.is_configured() {
            tracing::info!("Stripe client initialized");
        } else {
            tracing::warn!("Stripe credentials not configured - billing features disabled");
        }

        let extractors = ExtractorRegistry::with_defaults(config.upload.max_extracted_bytes);

        Ok(AppState {
            config: Arc::new(config),
            repo,
            extractors,
            provider,
            stripe,
            sessions,
        })
    }

    /// Bind a listener for an already assembled state.
    pub async fn from_state(state: AppState) -> Result<Self, AppError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], state.config.common.port));
        let listener = TcpListener::bind(addr).await?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            port,
            listener,
            router: build_router(state),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped<F>(self, shutdown: F) -> Result<(), AppError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!(port = self.port, "HTTP server listening");

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
