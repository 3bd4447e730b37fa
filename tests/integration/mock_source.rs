//! Mock quote sources for integration testing.
//!
//! `InMemorySource` is a deterministic, fully controllable source holding a
//! fixed catalogue of quotes. `MockQuotes` is a `mockall` mock for tests
//! that assert on call counts and arguments.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use mockall::mock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use sedori::data::{QuoteSource, SourceError};
use sedori::types::{PricePoint, PriceQuote, ProductQuery};

mock! {
    pub Quotes {}

    #[async_trait]
    impl QuoteSource for Quotes {
        async fn fetch_quote(&self, query: &ProductQuery) -> Result<PriceQuote, SourceError>;
        fn name(&self) -> &str;
    }
}

/// In-memory catalogue source.
pub struct InMemorySource {
    quotes: Vec<PriceQuote>,
    calls: Arc<AtomicUsize>,
    /// If set, every fetch fails with a retryable error carrying this text.
    force_error: Arc<Mutex<Option<String>>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::with_quotes(Self::default_quotes())
    }

    pub fn with_quotes(quotes: Vec<PriceQuote>) -> Self {
        Self {
            quotes,
            calls: Arc::new(AtomicUsize::new(0)),
            force_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Force all subsequent fetches to fail with a retryable error.
    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    /// Shared call counter, readable after the source is moved.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    /// Handle to toggle errors after the source is moved.
    pub fn error_switch(&self) -> Arc<Mutex<Option<String>>> {
        self.force_error.clone()
    }

    /// Known products with deterministic prices and ranks.
    fn default_quotes() -> Vec<PriceQuote> {
        vec![
            // Healthy seller: 4800 yen, fast rank, steady history
            quote("B000GOOD01", dec!(4800), 1_200, &[4700, 4750, 4800, 4900, 4850]),
            // Profitable but slow-moving
            quote("B000SLOW01", dec!(4800), 250_000, &[4800, 4820, 4790]),
            // No offers at all
            quote("B000NOOFFR", Decimal::ZERO, 3_000, &[]),
            // Barcode-keyed product with a thin history
            quote("4901234567894", dec!(1980), 8_000, &[1980]),
        ]
    }
}

/// Build a quote whose history is one price per day, newest last.
pub fn quote(identifier: &str, price: Decimal, rank: u64, history: &[i64]) -> PriceQuote {
    let now = Utc::now();
    let n = history.len() as i64;
    PriceQuote {
        identifier: identifier.to_string(),
        competitor_price: price,
        sales_rank: rank,
        price_history: history
            .iter()
            .enumerate()
            .map(|(i, p)| PricePoint {
                date: now - Duration::days(n - i as i64),
                price: Decimal::from(*p),
            })
            .collect(),
        title: Some(format!("Test product {identifier}")),
        currency: "JPY".to_string(),
    }
}

#[async_trait]
impl QuoteSource for InMemorySource {
    async fn fetch_quote(&self, query: &ProductQuery) -> Result<PriceQuote, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.force_error.lock().unwrap().as_ref() {
            return Err(SourceError::Retryable {
                source_name: "memory".to_string(),
                message: err.clone(),
            });
        }

        [query.asin.as_deref(), query.barcode.as_deref()]
            .into_iter()
            .flatten()
            .find_map(|id| self.quotes.iter().find(|q| q.identifier == id).cloned())
            .ok_or_else(|| SourceError::NotFound(query.identifier().to_string()))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
