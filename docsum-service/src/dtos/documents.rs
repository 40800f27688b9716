use serde::Serialize;

use crate::models::{Document, DocumentWithSummaries, Summary};

#[derive(Debug, Serialize)]
pub struct ExtractTextResponse {
    pub text: String,
    pub document: Document,
}

/// A document with its summaries, newest first.
#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    #[serde(flatten)]
    pub document: Document,
    pub summaries: Vec<Summary>,
    pub latest_summary: Option<String>,
}

impl From<DocumentWithSummaries> for DocumentResponse {
    fn from(value: DocumentWithSummaries) -> Self {
        let latest_summary = value.latest_summary().map(|s| s.content.clone());
        Self {
            document: value.document,
            summaries: value.summaries,
            latest_summary,
        }
    }
}
