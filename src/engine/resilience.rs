//! Resilience layer around a quote source.
//!
//! Every fetch passes through, in order: the TTL cache, the circuit
//! breaker, the per-source concurrency limiter, the request budget and the
//! retry loop. Shared state lives behind `std::sync::Mutex` and is never
//! held across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::data::{QuoteSource, SourceError};
use crate::types::{PriceQuote, ProductQuery, ServiceFlags, ServiceResult};

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Consecutive failures before the breaker opens.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// How long an open breaker rejects calls.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

pub const REASON_CIRCUIT_OPEN: &str = "circuit_open";
pub const REASON_BUDGET_EXCEEDED: &str = "budget_exceeded";
pub const REASON_RETRY_EXHAUSTED: &str = "retry_exhausted";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResilienceError {
    #[error("Request budget exceeded for {key} (limit {limit})")]
    BudgetExceeded { key: String, limit: u32 },

    #[error("Circuit open for {key}")]
    CircuitOpen { key: String },
}

/// Lock, recovering the guard if a previous holder panicked.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Request budget
// ---------------------------------------------------------------------------

/// Per-key call counter with a hard limit per process run.
#[derive(Debug, Default)]
pub struct RequestBudget {
    used: Mutex<HashMap<String, u32>>,
}

impl RequestBudget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one call against `key`, failing once `limit` calls were made.
    pub fn consume(&self, key: &str, limit: u32) -> Result<(), ResilienceError> {
        let mut used = lock(&self.used);
        let count = used.entry(key.to_string()).or_insert(0);
        if *count >= limit {
            return Err(ResilienceError::BudgetExceeded {
                key: key.to_string(),
                limit,
            });
        }
        *count += 1;
        Ok(())
    }

    pub fn remaining(&self, key: &str, limit: u32) -> u32 {
        let used = lock(&self.used).get(key).copied().unwrap_or(0);
        limit.saturating_sub(used)
    }
}

// ---------------------------------------------------------------------------
// Per-key concurrency limiter
// ---------------------------------------------------------------------------

/// Lazily creates one semaphore per key, each with `max_inflight` permits.
#[derive(Debug)]
pub struct KeySemaphore {
    max_inflight: usize,
    semaphores: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl KeySemaphore {
    pub fn new(max_inflight: usize) -> Self {
        Self {
            max_inflight: max_inflight.max(1),
            semaphores: Mutex::new(HashMap::new()),
        }
    }

    fn semaphore(&self, key: &str) -> Arc<Semaphore> {
        lock(&self.semaphores)
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.max_inflight)))
            .clone()
    }

    /// Wait for a permit on `key`. The permit is released on drop.
    pub async fn acquire(&self, key: &str) -> Result<OwnedSemaphorePermit, tokio::sync::AcquireError> {
        self.semaphore(key).acquire_owned().await
    }

    pub fn available(&self, key: &str) -> usize {
        self.semaphore(key).available_permits()
    }
}

// ---------------------------------------------------------------------------
// Circuit breaker
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Opens after `failure_threshold` consecutive failures and rejects calls
/// until `cooldown` has elapsed. Any success closes it again.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    state: Mutex<BreakerState>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_COOLDOWN)
    }
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown,
            state: Mutex::new(BreakerState::default()),
        }
    }

    /// Whether a call may proceed. An expired cooldown closes the breaker.
    pub fn allow(&self) -> bool {
        let mut state = lock(&self.state);
        match state.opened_at {
            Some(opened) if opened.elapsed() >= self.cooldown => {
                info!("Circuit breaker cooldown elapsed, closing");
                *state = BreakerState::default();
                true
            }
            Some(_) => false,
            None => true,
        }
    }

    pub fn check(&self, key: &str) -> Result<(), ResilienceError> {
        if self.allow() {
            Ok(())
        } else {
            Err(ResilienceError::CircuitOpen { key: key.to_string() })
        }
    }

    pub fn record_success(&self) {
        *lock(&self.state) = BreakerState::default();
    }

    pub fn record_failure(&self) {
        let mut state = lock(&self.state);
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.failure_threshold && state.opened_at.is_none() {
            warn!(failures = state.consecutive_failures, "Circuit breaker opened");
            state.opened_at = Some(Instant::now());
        }
    }

    pub fn is_open(&self) -> bool {
        lock(&self.state).opened_at.is_some()
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Exponential backoff: `base * 2^(attempt-1)`, capped at `max_backoff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first.
    pub max_retries: u32,
    pub base: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before `attempt` (1-based retry number). Zero for the first call.
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        self.base.saturating_mul(factor).min(self.max_backoff)
    }
}

// ---------------------------------------------------------------------------
// Quote cache
// ---------------------------------------------------------------------------

struct CacheEntry {
    quote: PriceQuote,
    inserted_at: Instant,
}

/// In-memory TTL cache of quotes keyed by product identifier.
pub struct QuoteCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl QuoteCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<PriceQuote> {
        let mut entries = lock(&self.entries);
        match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.quote.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: &str, quote: PriceQuote) {
        if self.ttl.is_zero() {
            return;
        }
        lock(&self.entries).insert(
            key.to_string(),
            CacheEntry {
                quote,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Resilient source
// ---------------------------------------------------------------------------

/// Knobs for [`ResilientSource`], filled from configuration.
#[derive(Debug, Clone)]
pub struct ResilienceSettings {
    pub retry: RetryPolicy,
    pub cache_ttl: Duration,
    pub budget_limit: u32,
    pub max_inflight: usize,
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            cache_ttl: Duration::from_secs(300),
            budget_limit: 100,
            max_inflight: 4,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

/// Wraps a [`QuoteSource`] with caching, budget, breaker and retries.
///
/// Exhausted retries, an open breaker and a spent budget are not errors:
/// they return a `ServiceResult` with no data and degraded flags so the
/// caller can still produce a (non-buy) report.
pub struct ResilientSource<S: QuoteSource> {
    source: S,
    retry: RetryPolicy,
    budget_limit: u32,
    budget: RequestBudget,
    limiter: KeySemaphore,
    breaker: CircuitBreaker,
    cache: QuoteCache,
}

impl<S: QuoteSource> ResilientSource<S> {
    pub fn new(source: S, settings: ResilienceSettings) -> Self {
        Self {
            source,
            retry: settings.retry,
            budget_limit: settings.budget_limit,
            budget: RequestBudget::new(),
            limiter: KeySemaphore::new(settings.max_inflight),
            breaker: CircuitBreaker::new(settings.failure_threshold, settings.cooldown),
            cache: QuoteCache::new(settings.cache_ttl),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn budget_remaining(&self) -> u32 {
        self.budget.remaining(self.source.name(), self.budget_limit)
    }

    /// Fetch a quote through every resilience layer.
    ///
    /// Errors are only returned for non-retryable source failures.
    pub async fn fetch(&self, query: &ProductQuery) -> Result<ServiceResult<PriceQuote>, SourceError> {
        let identifier = query.identifier();
        let source_name = self.source.name();

        if let Some(quote) = self.cache.get(identifier) {
            debug!(identifier, "Quote cache hit");
            return Ok(ServiceResult {
                data: Some(quote),
                flags: ServiceFlags::cached(),
            });
        }

        if let Err(e) = self.breaker.check(source_name) {
            warn!(identifier, error = %e, "Skipping fetch");
            return Ok(ServiceResult::missing(ServiceFlags {
                circuit_open: true,
                ..ServiceFlags::degraded(REASON_CIRCUIT_OPEN)
            }));
        }

        let _permit = self
            .limiter
            .acquire(source_name)
            .await
            .map_err(|e| SourceError::retryable(source_name, e.to_string()))?;

        let mut last_error = None;

        for attempt in 0..=self.retry.max_retries {
            if attempt > 0 {
                let delay = self.retry.delay(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, identifier, "Retrying quote fetch");
                tokio::time::sleep(delay).await;
            }

            if let Err(e) = self.budget.consume(source_name, self.budget_limit) {
                warn!(identifier, error = %e, "Request budget exhausted");
                return Ok(ServiceResult::missing(ServiceFlags::degraded(REASON_BUDGET_EXCEEDED)));
            }

            match self.source.fetch_quote(query).await {
                Ok(quote) => {
                    self.breaker.record_success();
                    self.cache.insert(identifier, quote.clone());
                    return Ok(ServiceResult::fresh(quote));
                }
                Err(e) if e.is_retryable() => {
                    warn!(attempt, identifier, source = source_name, error = %e, "Retryable quote fetch failure");
                    last_error = Some(e);
                }
                Err(e @ SourceError::NotFound(_)) => return Err(e),
                Err(e) => {
                    self.breaker.record_failure();
                    return Err(e);
                }
            }
        }

        self.breaker.record_failure();
        let last_error = last_error.map(|e| e.to_string()).unwrap_or_default();
        warn!(
            identifier,
            retries = self.retry.max_retries,
            error = %last_error,
            "Quote fetch retries exhausted"
        );
        Ok(ServiceResult::missing(ServiceFlags::degraded(REASON_RETRY_EXHAUSTED)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
