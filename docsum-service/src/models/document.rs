use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Summary;

/// One uploaded file. Written once per successful extraction, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct Document {
    pub id: Uuid,
    pub user_id: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub created_at: DateTime<Utc>,
}

/// Insert payload; id and timestamp are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub user_id: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
}

impl NewDocument {
    pub fn into_document(self) -> Document {
        Document {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            file_name: self.file_name,
            file_type: self.file_type,
            file_size: self.file_size,
            created_at: Utc::now(),
        }
    }
}

/// A document together with its summaries, newest summary first.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentWithSummaries {
    #[serde(flatten)]
    pub document: Document,
    pub summaries: Vec<Summary>,
}

impl DocumentWithSummaries {
    pub fn latest_summary(&self) -> Option<&Summary> {
        self.summaries.first()
    }
}
