//! JSON file quote source.
//!
//! Reads quotes from a local JSON document holding either a single quote
//! object or an array of them. The file is re-read on every fetch so it can
//! be edited between runs of a long-lived process.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{QuoteSource, SourceError};
use crate::types::{PriceQuote, ProductQuery};

const SOURCE_NAME: &str = "file";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QuoteDocument {
    Many(Vec<PriceQuote>),
    One(PriceQuote),
}

impl QuoteDocument {
    fn into_vec(self) -> Vec<PriceQuote> {
        match self {
            QuoteDocument::Many(quotes) => quotes,
            QuoteDocument::One(quote) => vec![quote],
        }
    }
}

pub struct FileQuoteSource {
    path: PathBuf,
}

impl FileQuoteSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<PriceQuote>, SourceError> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| SourceError::Io {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })?;
        let doc: QuoteDocument = serde_json::from_str(&contents).map_err(|e| SourceError::Malformed {
            source_name: SOURCE_NAME.to_string(),
            message: format!("{}: {e}", self.path.display()),
        })?;
        Ok(doc.into_vec())
    }
}

#[async_trait]
impl QuoteSource for FileQuoteSource {
    async fn fetch_quote(&self, query: &ProductQuery) -> Result<PriceQuote, SourceError> {
        let quotes = self.load().await?;
        debug!(path = %self.path.display(), count = quotes.len(), "Loaded quote file");

        // ASIN match wins over barcode match
        let candidates = [query.asin.as_deref(), query.barcode.as_deref()];
        candidates
            .into_iter()
            .flatten()
            .find_map(|id| quotes.iter().find(|q| q.identifier == id).cloned())
            .ok_or_else(|| SourceError::NotFound(query.identifier().to_string()))
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}
