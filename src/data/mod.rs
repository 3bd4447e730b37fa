//! Quote sources.
//!
//! Defines the `QuoteSource` trait, the boundary to whatever service
//! supplies prices and sales ranks, and two implementations: a JSON file
//! source for offline runs and a generic HTTP JSON source.

pub mod file;
pub mod http;

use async_trait::async_trait;

use crate::types::{PriceQuote, ProductQuery};

/// Errors raised by quote sources, classified for the retry policy.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("No quote found for {0}")]
    NotFound(String),

    #[error("Transient failure ({source_name}): {message}")]
    Retryable { source_name: String, message: String },

    #[error("Request rejected ({source_name}): {message}")]
    Rejected { source_name: String, message: String },

    #[error("Malformed response ({source_name}): {message}")]
    Malformed { source_name: String, message: String },

    #[error("Failed to read {path}: {message}")]
    Io { path: String, message: String },
}

impl SourceError {
    /// Whether a retry has a chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::Retryable { .. })
    }

    pub(crate) fn retryable(source_name: &str, message: impl Into<String>) -> Self {
        SourceError::Retryable {
            source_name: source_name.to_string(),
            message: message.into(),
        }
    }
}

/// Abstraction over price and rank providers.
///
/// Implementors fetch a single quote per call; caching, budgets and retries
/// are layered on top by `engine::resilience::ResilientSource`.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Fetch the current quote for a product.
    async fn fetch_quote(&self, query: &ProductQuery) -> Result<PriceQuote, SourceError>;

    /// Source name for logging and budget keys.
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: QuoteSource + ?Sized> QuoteSource for Box<T> {
    async fn fetch_quote(&self, query: &ProductQuery) -> Result<PriceQuote, SourceError> {
        (**self).fetch_quote(query).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
