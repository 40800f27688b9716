//! Persistence for documents, summaries and subscriptions.
//!
//! [`DocumentRepository`] is the seam handlers depend on. [`PgRepository`]
//! is the PostgreSQL store; `memory::InMemoryRepository` backs local runs
//! and tests.

use crate::config::DatabaseConfig;
use crate::models::{Document, DocumentWithSummaries, NewDocument, Subscription, SubscriptionUpsert, Summary};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use uuid::Uuid;

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn create_document(&self, doc: NewDocument) -> Result<Document, AppError>;

    /// The user's documents, newest first, each with summaries newest first.
    async fn list_documents(&self, user_id: &str) -> Result<Vec<DocumentWithSummaries>, AppError>;

    async fn get_document(
        &self,
        user_id: &str,
        id: Uuid,
    ) -> Result<Option<DocumentWithSummaries>, AppError>;

    /// Fails with `NotFound` unless `document_id` exists and belongs to `user_id`.
    async fn create_summary(
        &self,
        user_id: &str,
        document_id: Uuid,
        content: String,
    ) -> Result<Summary, AppError>;

    /// Insert or update the row keyed by `stripe_subscription_id`.
    async fn upsert_subscription(&self, upsert: SubscriptionUpsert)
        -> Result<Subscription, AppError>;

    async fn get_subscription_for_user(
        &self,
        user_id: &str,
    ) -> Result<Option<Subscription>, AppError>;

    async fn is_event_processed(&self, event_id: &str) -> Result<bool, AppError>;

    /// Record a webhook event id. Returns false if it was already recorded.
    async fn mark_event_processed(&self, event_id: &str, event_type: &str)
        -> Result<bool, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, AppError> {
    tracing::info!(
        max_connections = config.max_connections,
        "Connecting to PostgreSQL"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(config.url.expose_secret())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            AppError::DatabaseError(anyhow::anyhow!(e))
        })?;

    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), AppError> {
    tracing::info!("Running database migrations");
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// One row of the documents-left-join-summaries read.
#[derive(sqlx::FromRow)]
struct DocumentSummaryRow {
    id: Uuid,
    user_id: String,
    file_name: String,
    file_type: String,
    file_size: i64,
    created_at: DateTime<Utc>,
    summary_id: Option<Uuid>,
    summary_content: Option<String>,
    summary_created_at: Option<DateTime<Utc>>,
}

const DOCUMENT_WITH_SUMMARIES_SELECT: &str = r#"
    SELECT d.id, d.user_id, d.file_name, d.file_type, d.file_size, d.created_at,
           s.id AS summary_id, s.content AS summary_content, s.created_at AS summary_created_at
    FROM documents d
    LEFT JOIN summaries s ON s.document_id = d.id
"#;

/// Fold joined rows (already ordered by document) into nested documents.
fn group_rows(rows: Vec<DocumentSummaryRow>) -> Vec<DocumentWithSummaries> {
    let mut out: Vec<DocumentWithSummaries> = Vec::new();

    for row in rows {
        let summary = match (row.summary_id, row.summary_content, row.summary_created_at) {
            (Some(id), Some(content), Some(created_at)) => Some(Summary {
                id,
                document_id: row.id,
                content,
                created_at,
            }),
            _ => None,
        };

        match out.last_mut() {
            Some(last) if last.document.id == row.id => {
                last.summaries.extend(summary);
            }
            _ => out.push(DocumentWithSummaries {
                document: Document {
                    id: row.id,
                    user_id: row.user_id,
                    file_name: row.file_name,
                    file_type: row.file_type,
                    file_size: row.file_size,
                    created_at: row.created_at,
                },
                summaries: summary.into_iter().collect(),
            }),
        }
    }

    out
}

#[async_trait]
impl DocumentRepository for PgRepository {
    async fn create_document(&self, doc: NewDocument) -> Result<Document, AppError> {
        let doc = doc.into_document();

        let created = sqlx::query_as::<_, Document>(
            r#"
            INSERT INTO documents (id, user_id, file_name, file_type, file_size, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, file_name, file_type, file_size, created_at
            "#,
        )
        .bind(doc.id)
        .bind(&doc.user_id)
        .bind(&doc.file_name)
        .bind(&doc.file_type)
        .bind(doc.file_size)
        .bind(doc.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn list_documents(&self, user_id: &str) -> Result<Vec<DocumentWithSummaries>, AppError> {
        let query = format!(
            "{} WHERE d.user_id = $1 ORDER BY d.created_at DESC, d.id, s.created_at DESC",
            DOCUMENT_WITH_SUMMARIES_SELECT
        );

        let rows = sqlx::query_as::<_, DocumentSummaryRow>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(group_rows(rows))
    }

    async fn get_document(
        &self,
        user_id: &str,
        id: Uuid,
    ) -> Result<Option<DocumentWithSummaries>, AppError> {
        let query = format!(
            "{} WHERE d.user_id = $1 AND d.id = $2 ORDER BY s.created_at DESC",
            DOCUMENT_WITH_SUMMARIES_SELECT
        );

        let rows = sqlx::query_as::<_, DocumentSummaryRow>(&query)
            .bind(user_id)
            .bind(id)
            .fetch_all(&self.pool)
            .await?;

        Ok(group_rows(rows).into_iter().next())
    }

    async fn create_summary(
        &self,
        user_id: &str,
        document_id: Uuid,
        content: String,
    ) -> Result<Summary, AppError> {
        let summary = Summary::new(document_id, content);

        // Ownership check and insert in one statement.
        sqlx::query_as::<_, Summary>(
            r#"
            INSERT INTO summaries (id, document_id, content, created_at)
            SELECT $1, d.id, $3, $4
            FROM documents d
            WHERE d.id = $2 AND d.user_id = $5
            RETURNING id, document_id, content, created_at
            "#,
        )
        .bind(summary.id)
        .bind(document_id)
        .bind(&summary.content)
        .bind(summary.created_at)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Document not found")))
    }

    async fn upsert_subscription(
        &self,
        upsert: SubscriptionUpsert,
    ) -> Result<Subscription, AppError> {
        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            INSERT INTO subscriptions (
                id, user_id, stripe_customer_id, stripe_subscription_id,
                stripe_price_id, status, current_period_end, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, now(), now())
            ON CONFLICT (stripe_subscription_id) DO UPDATE SET
                user_id = COALESCE(EXCLUDED.user_id, subscriptions.user_id),
                stripe_customer_id = COALESCE(EXCLUDED.stripe_customer_id, subscriptions.stripe_customer_id),
                stripe_price_id = COALESCE(EXCLUDED.stripe_price_id, subscriptions.stripe_price_id),
                status = EXCLUDED.status,
                current_period_end = COALESCE(EXCLUDED.current_period_end, subscriptions.current_period_end),
                updated_at = now()
            RETURNING id, user_id, stripe_customer_id, stripe_subscription_id,
                      stripe_price_id, status, current_period_end, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&upsert.user_id)
        .bind(&upsert.stripe_customer_id)
        .bind(&upsert.stripe_subscription_id)
        .bind(&upsert.stripe_price_id)
        .bind(&upsert.status)
        .bind(upsert.current_period_end)
        .fetch_one(&self.pool)
        .await?;

        Ok(subscription)
    }

    async fn get_subscription_for_user(
        &self,
        user_id: &str,
    ) -> Result<Option<Subscription>, AppError> {
        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT id, user_id, stripe_customer_id, stripe_subscription_id,
                   stripe_price_id, status, current_period_end, created_at, updated_at
            FROM subscriptions
            WHERE user_id = $1
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(subscription)
    }

    async fn is_event_processed(&self, event_id: &str) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM processed_webhook_events WHERE event_id = $1)",
        )
        .bind(event_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn mark_event_processed(
        &self,
        event_id: &str,
        event_type: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_webhook_events (event_id, event_type, processed_at)
            VALUES ($1, $2, now())
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
