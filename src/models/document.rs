//! Opportunity document model.

use serde::{Deserialize, Serialize};

/// Kind of file attached to an opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    Document,
    Amendment,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Amendment => "amendment",
        }
    }
}

/// A downloaded document, bytes included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Opportunity the document belongs to.
    pub system_id: String,
    pub doc_type: DocType,
    pub filename: String,
    /// Posting date, present on amendments.
    pub date: Option<String>,
    /// Final URL the bytes were fetched from.
    pub original_url: String,
    pub contents: Vec<u8>,
    pub content_type: String,
}

impl Document {
    pub fn content_length(&self) -> u64 {
        self.contents.len() as u64
    }
}
