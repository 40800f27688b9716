//! Text extraction for uploaded documents.
//!
//! Each supported format is a [`TextExtractor`]; the [`ExtractorRegistry`]
//! picks the first one that accepts the declared MIME type or file name.

use crate::config::DEFAULT_MAX_EXTRACTED_BYTES;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Cursor, Read};
use std::sync::Arc;
use thiserror::Error;

pub const MIME_PLAIN_TEXT: &str = "text/plain";
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_LEGACY_DOC: &str = "application/msword";

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Unsupported file type: {0}")]
    Unsupported(String),

    #[error("Failed to extract text from {file_name}: {reason}")]
    Failed { file_name: String, reason: String },
}

impl ExtractError {
    fn failed(file_name: &str, reason: impl ToString) -> Self {
        ExtractError::Failed {
            file_name: file_name.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// A single document format.
pub trait TextExtractor: Send + Sync {
    /// Short label used in logs and metrics.
    fn name(&self) -> &'static str;

    fn supports(&self, mime_type: &str, file_name: &str) -> bool;

    fn extract(&self, bytes: &[u8], file_name: &str) -> Result<String, ExtractError>;
}

pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn name(&self) -> &'static str {
        "text"
    }

    fn supports(&self, mime_type: &str, _file_name: &str) -> bool {
        mime_type == MIME_PLAIN_TEXT
    }

    fn extract(&self, bytes: &[u8], _file_name: &str) -> Result<String, ExtractError> {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn supports(&self, mime_type: &str, _file_name: &str) -> bool {
        mime_type == MIME_PDF
    }

    fn extract(&self, bytes: &[u8], file_name: &str) -> Result<String, ExtractError> {
        // pdf-extract panics on some malformed inputs instead of returning an error.
        std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
            .map_err(|_| ExtractError::failed(file_name, "malformed PDF"))?
            .map_err(|e| ExtractError::failed(file_name, e))
    }
}

/// Office Open XML word documents.
pub struct DocxExtractor {
    /// Ceiling on the decompressed `word/document.xml`.
    max_xml_bytes: u64,
}

impl DocxExtractor {
    pub fn with_limit(max_xml_bytes: usize) -> Self {
        Self {
            max_xml_bytes: max_xml_bytes as u64,
        }
    }

    fn read_document_xml(&self, bytes: &[u8]) -> anyhow::Result<String> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
        let entry = archive.by_name("word/document.xml")?;

        // The declared size can lie, so the read itself is bounded too.
        if entry.size() > self.max_xml_bytes {
            anyhow::bail!(
                "document.xml expands to {} bytes, limit is {}",
                entry.size(),
                self.max_xml_bytes
            );
        }

        let mut xml = String::new();
        entry.take(self.max_xml_bytes + 1).read_to_string(&mut xml)?;
        if xml.len() as u64 > self.max_xml_bytes {
            anyhow::bail!("document.xml exceeds {} bytes", self.max_xml_bytes);
        }
        Ok(xml)
    }

    fn text_runs(xml: &str) -> anyhow::Result<String> {
        let mut reader = Reader::from_str(xml);
        let mut out = String::new();
        let mut in_text = false;

        loop {
            match reader.read_event()? {
                Event::Start(e) if e.name().as_ref() == b"w:t" => in_text = true,
                Event::End(e) => match e.name().as_ref() {
                    b"w:t" => in_text = false,
                    b"w:p" => out.push('\n'),
                    _ => {}
                },
                Event::Empty(e) => match e.name().as_ref() {
                    b"w:tab" => out.push('\t'),
                    b"w:br" | b"w:cr" => out.push('\n'),
                    _ => {}
                },
                Event::Text(t) if in_text => out.push_str(&t.unescape()?),
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(out.trim_end().to_string())
    }
}

impl TextExtractor for DocxExtractor {
    fn name(&self) -> &'static str {
        "docx"
    }

    fn supports(&self, mime_type: &str, file_name: &str) -> bool {
        if mime_type == MIME_LEGACY_DOC {
            return false;
        }
        mime_type == MIME_DOCX
            || mime_type.contains("word")
            || file_name.to_lowercase().ends_with(".docx")
    }

    fn extract(&self, bytes: &[u8], file_name: &str) -> Result<String, ExtractError> {
        let xml = self
            .read_document_xml(bytes)
            .map_err(|e| ExtractError::failed(file_name, e))?;
        Self::text_runs(&xml).map_err(|e| ExtractError::failed(file_name, e))
    }
}

/// Text produced by one extractor.
#[derive(Debug)]
pub struct Extraction {
    /// [`TextExtractor::name`] of the extractor that ran.
    pub extractor: &'static str,
    pub text: String,
}

/// Ordered set of extractors; lookup is first match.
#[derive(Clone)]
pub struct ExtractorRegistry {
    extractors: Vec<Arc<dyn TextExtractor>>,
    max_text_bytes: usize,
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::with_defaults(DEFAULT_MAX_EXTRACTED_BYTES)
    }
}

impl ExtractorRegistry {
    pub fn new(max_text_bytes: usize) -> Self {
        Self {
            extractors: Vec::new(),
            max_text_bytes,
        }
    }

    /// Plain text, PDF and DOCX, with output capped at `max_text_bytes`.
    pub fn with_defaults(max_text_bytes: usize) -> Self {
        Self::new(max_text_bytes)
            .register(PlainTextExtractor)
            .register(PdfExtractor)
            .register(DocxExtractor::with_limit(max_text_bytes))
    }

    pub fn register(mut self, extractor: impl TextExtractor + 'static) -> Self {
        self.extractors.push(Arc::new(extractor));
        self
    }

    pub fn find(&self, mime_type: &str, file_name: &str) -> Option<Arc<dyn TextExtractor>> {
        self.extractors
            .iter()
            .find(|e| e.supports(mime_type, file_name))
            .cloned()
    }

    pub fn extract_text(
        &self,
        bytes: &[u8],
        file_name: &str,
        mime_type: &str,
    ) -> Result<Extraction, ExtractError> {
        let extractor = self
            .find(mime_type, file_name)
            .ok_or_else(|| ExtractError::Unsupported(mime_type.to_string()))?;

        tracing::debug!(
            extractor = extractor.name(),
            file_name = %file_name,
            size = bytes.len(),
            "Extracting text"
        );

        let text = extractor.extract(bytes, file_name)?;
        if text.len() > self.max_text_bytes {
            return Err(ExtractError::failed(
                file_name,
                format!("extracted text exceeds {} bytes", self.max_text_bytes),
            ));
        }

        Ok(Extraction {
            extractor: extractor.name(),
            text,
        })
    }
}
