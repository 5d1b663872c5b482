//! Crawl error taxonomy.

use thiserror::Error;

use crate::storage::StoreError;

/// Errors raised while crawling the portal or persisting what it yields.
///
/// Only [`CrawlError::Authentication`] and [`CrawlError::WriterStopped`] end
/// a run. The other variants are logged and scoped to the page or record
/// that raised them.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Authentication failed: {0}")]
    Authentication(String),
    #[error("Unexpected page shape at {url}: {message}")]
    NavigationParse { url: String, message: String },
    #[error("Invalid {kind} record: {message}")]
    RecordValidation { kind: &'static str, message: String },
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Record writer stopped before the crawl finished")]
    WriterStopped,
}

impl CrawlError {
    pub fn navigation(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NavigationParse {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Whether this error must stop the whole crawl run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Authentication(_) | Self::WriterStopped)
    }
}

pub type CrawlResult<T> = Result<T, CrawlError>;
