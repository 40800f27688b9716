use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct Summary {
    pub id: Uuid,
    pub document_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Summary {
    pub fn new(document_id: Uuid, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            content,
            created_at: Utc::now(),
        }
    }
}
