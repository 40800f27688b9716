//! Process-local repository used for local development and tests.

use super::database::DocumentRepository;
use crate::models::{
    Document, DocumentWithSummaries, NewDocument, Subscription, SubscriptionUpsert, Summary,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Store {
    documents: Vec<Document>,
    summaries: Vec<Summary>,
    subscriptions: HashMap<String, Subscription>,
    processed_events: HashMap<String, (String, DateTime<Utc>)>,
}

impl Store {
    fn with_summaries(&self, document: &Document) -> DocumentWithSummaries {
        let mut summaries: Vec<Summary> = self
            .summaries
            .iter()
            .rev()
            .filter(|s| s.document_id == document.id)
            .cloned()
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        DocumentWithSummaries {
            document: document.clone(),
            summaries,
        }
    }
}

#[derive(Default)]
pub struct InMemoryRepository {
    store: RwLock<Store>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn document_count(&self) -> usize {
        self.store.read().await.documents.len()
    }

    pub async fn summary_count(&self) -> usize {
        self.store.read().await.summaries.len()
    }

    pub async fn subscription_count(&self) -> usize {
        self.store.read().await.subscriptions.len()
    }

    pub async fn subscription(&self, stripe_subscription_id: &str) -> Option<Subscription> {
        self.store
            .read()
            .await
            .subscriptions
            .get(stripe_subscription_id)
            .cloned()
    }
}

#[async_trait]
impl DocumentRepository for InMemoryRepository {
    async fn create_document(&self, doc: NewDocument) -> Result<Document, AppError> {
        let document = doc.into_document();
        self.store.write().await.documents.push(document.clone());
        Ok(document)
    }

    async fn list_documents(&self, user_id: &str) -> Result<Vec<DocumentWithSummaries>, AppError> {
        let store = self.store.read().await;
        let mut documents: Vec<DocumentWithSummaries> = store
            .documents
            .iter()
            .rev()
            .filter(|d| d.user_id == user_id)
            .map(|d| store.with_summaries(d))
            .collect();
        documents.sort_by(|a, b| b.document.created_at.cmp(&a.document.created_at));
        Ok(documents)
    }

    async fn get_document(
        &self,
        user_id: &str,
        id: Uuid,
    ) -> Result<Option<DocumentWithSummaries>, AppError> {
        let store = self.store.read().await;
        Ok(store
            .documents
            .iter()
            .find(|d| d.id == id && d.user_id == user_id)
            .map(|d| store.with_summaries(d)))
    }

    async fn create_summary(
        &self,
        user_id: &str,
        document_id: Uuid,
        content: String,
    ) -> Result<Summary, AppError> {
        let mut store = self.store.write().await;
        let owned = store
            .documents
            .iter()
            .any(|d| d.id == document_id && d.user_id == user_id);
        if !owned {
            return Err(AppError::NotFound(anyhow::anyhow!("Document not found")));
        }

        let summary = Summary::new(document_id, content);
        store.summaries.push(summary.clone());
        Ok(summary)
    }

    async fn upsert_subscription(
        &self,
        upsert: SubscriptionUpsert,
    ) -> Result<Subscription, AppError> {
        let mut store = self.store.write().await;
        let key = upsert.stripe_subscription_id.clone();
        let existing = store.subscriptions.remove(&key);
        let subscription = upsert.apply(existing);
        store.subscriptions.insert(key, subscription.clone());
        Ok(subscription)
    }

    async fn get_subscription_for_user(
        &self,
        user_id: &str,
    ) -> Result<Option<Subscription>, AppError> {
        let store = self.store.read().await;
        Ok(store
            .subscriptions
            .values()
            .filter(|s| s.user_id.as_deref() == Some(user_id))
            .max_by_key(|s| s.updated_at)
            .cloned())
    }

    async fn is_event_processed(&self, event_id: &str) -> Result<bool, AppError> {
        Ok(self.store.read().await.processed_events.contains_key(event_id))
    }

    async fn mark_event_processed(
        &self,
        event_id: &str,
        event_type: &str,
    ) -> Result<bool, AppError> {
        let mut store = self.store.write().await;
        if store.processed_events.contains_key(event_id) {
            return Ok(false);
        }
        store
            .processed_events
            .insert(event_id.to_string(), (event_type.to_string(), Utc::now()));
        Ok(true)
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}
