//! HTTP JSON quote source.
//!
//! Talks to a price service exposing `GET {base_url}/quotes/{identifier}`
//! that answers with a `PriceQuote` JSON body. Auth, when configured, is an
//! `X-Api-Key` header whose value is read from an environment variable.
//! A query carrying both identifiers falls back to the barcode when the
//! ASIN is unknown.
//!
//! Status handling:
//! - 2xx: parse the body
//! - 404: `NotFound`
//! - 429 and 5xx, timeouts, connect errors: `Retryable`
//! - any other 4xx: `Rejected`

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::debug;

use super::{QuoteSource, SourceError};
use crate::types::{PriceQuote, ProductQuery};

const SOURCE_NAME: &str = "http";
const API_KEY_HEADER: &str = "X-Api-Key";

pub struct HttpQuoteSource {
    http: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl HttpQuoteSource {
    pub fn new(base_url: &str, api_key: Option<SecretString>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("SEDORI/0.1.0 (resale-appraiser)")
            .build()
            .context("Failed to build HTTP client for quote source")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn quote_url(&self, identifier: &str) -> String {
        format!("{}/quotes/{}", self.base_url, urlencoding::encode(identifier))
    }

    fn classify_transport(err: reqwest::Error) -> SourceError {
        if err.is_timeout() || err.is_connect() {
            SourceError::retryable(SOURCE_NAME, err.to_string())
        } else {
            SourceError::Rejected {
                source_name: SOURCE_NAME.to_string(),
                message: err.to_string(),
            }
        }
    }

    async fn fetch_identifier(&self, identifier: &str) -> Result<PriceQuote, SourceError> {
        let url = self.quote_url(identifier);
        debug!(url = %url, "Fetching quote");

        let mut request = self.http.get(&url).header("Accept", "application/json");
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key.expose_secret().as_str());
        }

        let resp = request.send().await.map_err(Self::classify_transport)?;
        let status = resp.status();

        if status == StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound(identifier.to_string()));
        }
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(SourceError::retryable(SOURCE_NAME, format!("status {status}")));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SourceError::Rejected {
                source_name: SOURCE_NAME.to_string(),
                message: format!("status {status}: {body}"),
            });
        }

        let body = resp.text().await.map_err(Self::classify_transport)?;
        serde_json::from_str(&body).map_err(|e| SourceError::Malformed {
            source_name: SOURCE_NAME.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl QuoteSource for HttpQuoteSource {
    /// Look up by ASIN, then by barcode when the ASIN is unknown.
    async fn fetch_quote(&self, query: &ProductQuery) -> Result<PriceQuote, SourceError> {
        let mut result = Err(SourceError::NotFound(query.identifier().to_string()));
        for identifier in [query.asin.as_deref(), query.barcode.as_deref()].into_iter().flatten() {
            result = self.fetch_identifier(identifier).await;
            if !matches!(result, Err(SourceError::NotFound(_))) {
                break;
            }
        }
        result
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
