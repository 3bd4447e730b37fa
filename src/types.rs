//! Shared types for the SEDORI appraiser.
//!
//! These types form the data model used across all modules. Quote sources,
//! the profit evaluator, the pipeline and the sinks all depend on them, so
//! they carry no behaviour beyond small derived helpers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Product query
// ---------------------------------------------------------------------------

/// User-supplied product identifier. At least one of the two must be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductQuery {
    pub asin: Option<String>,
    pub barcode: Option<String>,
}

impl ProductQuery {
    /// Build a query, rejecting the case where neither identifier is given.
    pub fn new(asin: Option<String>, barcode: Option<String>) -> Result<Self, SedoriError> {
        let asin = asin.filter(|s| !s.trim().is_empty());
        let barcode = barcode.filter(|s| !s.trim().is_empty());
        if asin.is_none() && barcode.is_none() {
            return Err(SedoriError::InvalidQuery(
                "either asin or barcode must be provided".to_string(),
            ));
        }
        Ok(Self { asin, barcode })
    }

    /// The identifier used for lookups and logging (ASIN wins over barcode).
    pub fn identifier(&self) -> &str {
        self.asin
            .as_deref()
            .or(self.barcode.as_deref())
            .unwrap_or("unknown")
    }
}

impl fmt::Display for ProductQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.asin, &self.barcode) {
            (Some(a), Some(b)) => write!(f, "ASIN {a} / barcode {b}"),
            (Some(a), None) => write!(f, "ASIN {a}"),
            (None, Some(b)) => write!(f, "barcode {b}"),
            (None, None) => write!(f, "<empty query>"),
        }
    }
}

// ---------------------------------------------------------------------------
// Price quote
// ---------------------------------------------------------------------------

fn default_currency() -> String {
    "JPY".to_string()
}

/// One observation in a product's price history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: DateTime<Utc>,
    pub price: Decimal,
}

/// Market data for one product, as returned by a quote source.
/// Immutable once obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// ASIN or barcode the quote was fetched for.
    pub identifier: String,
    /// Lowest competing landed price.
    pub competitor_price: Decimal,
    /// Marketplace sales rank (lower sells faster).
    pub sales_rank: u64,
    /// Price observations, oldest first, covering roughly the prior 30 days.
    #[serde(default)]
    pub price_history: Vec<PricePoint>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl PriceQuote {
    /// Placeholder used when no market data could be obtained. The rank is
    /// pinned to the maximum so a rank cap never passes by accident.
    pub fn unavailable(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            competitor_price: Decimal::ZERO,
            sales_rank: u64::MAX,
            price_history: Vec::new(),
            title: None,
            currency: default_currency(),
        }
    }
}

impl fmt::Display for PriceQuote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} (rank {}, {} history points)",
            self.identifier,
            self.competitor_price,
            self.currency,
            self.sales_rank,
            self.price_history.len(),
        )
    }
}

// ---------------------------------------------------------------------------
// Cost inputs and thresholds
// ---------------------------------------------------------------------------

/// Per-evaluation costs supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostInputs {
    pub purchase_cost: Decimal,
    #[serde(default)]
    pub shipping_fees: Decimal,
    #[serde(default)]
    pub taxes: Decimal,
    #[serde(default)]
    pub fba_fees: Decimal,
    /// Derived cost lines (storage, packaging, FX spread, returns...).
    #[serde(default)]
    pub extra_fees: Decimal,
}

impl CostInputs {
    pub fn new(purchase_cost: Decimal, shipping_fees: Decimal, taxes: Decimal, fba_fees: Decimal) -> Self {
        Self {
            purchase_cost,
            shipping_fees,
            taxes,
            fba_fees,
            extra_fees: Decimal::ZERO,
        }
    }

    /// Attach derived cost lines.
    pub fn with_extra_fees(mut self, extra_fees: Decimal) -> Self {
        self.extra_fees = extra_fees;
        self
    }

    /// Everything that is subtracted from the selling price.
    pub fn total(&self) -> Result<Decimal, SedoriError> {
        checked_sum([
            self.purchase_cost,
            self.shipping_fees,
            self.taxes,
            self.fba_fees,
            self.extra_fees,
        ])
        .ok_or(SedoriError::Overflow { quantity: "total_cost" })
    }
}

/// Sum of `values`, or `None` when it leaves the `Decimal` range.
pub fn checked_sum(values: impl IntoIterator<Item = Decimal>) -> Option<Decimal> {
    values.into_iter().try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v))
}

/// Purchase thresholds. Process-wide and read-only per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default)]
    pub min_profit: Decimal,
    #[serde(default)]
    pub min_roi: Decimal,
    /// Worst acceptable sales rank. `None` disables the rank check.
    #[serde(default)]
    pub max_rank: Option<u64>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_profit: Decimal::ZERO,
            min_roi: Decimal::ZERO,
            max_rank: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Fee breakdown
// ---------------------------------------------------------------------------

/// Itemised cost lines reported next to a decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub shipping_fees: Decimal,
    pub taxes: Decimal,
    pub fba_fees: Decimal,
    pub inbound_shipping: Decimal,
    pub packaging_materials: Decimal,
    pub storage_fee: Decimal,
    pub fx_spread: Decimal,
    pub returns_cost: Decimal,
}

impl FeeBreakdown {
    /// Lines derived from money settings rather than supplied by the caller.
    pub fn derived_total(&self) -> Result<Decimal, SedoriError> {
        checked_sum([
            self.inbound_shipping,
            self.packaging_materials,
            self.storage_fee,
            self.fx_spread,
            self.returns_cost,
        ])
        .ok_or(SedoriError::Overflow { quantity: "fees" })
    }

    pub fn total(&self) -> Result<Decimal, SedoriError> {
        checked_sum([self.shipping_fees, self.taxes, self.fba_fees, self.derived_total()?])
            .ok_or(SedoriError::Overflow { quantity: "fees" })
    }

    /// Apply `f` to every line (used for display quantisation).
    pub fn map(&self, f: impl Fn(Decimal) -> Decimal) -> Self {
        Self {
            shipping_fees: f(self.shipping_fees),
            taxes: f(self.taxes),
            fba_fees: f(self.fba_fees),
            inbound_shipping: f(self.inbound_shipping),
            packaging_materials: f(self.packaging_materials),
            storage_fee: f(self.storage_fee),
            fx_spread: f(self.fx_spread),
            returns_cost: f(self.returns_cost),
        }
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Why a threshold or input check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    ProfitBelowThreshold,
    RoiBelowThreshold,
    RankAboveThreshold,
    NoCompetitivePrice,
    DegradedInputs,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionReason::ProfitBelowThreshold => "profit_below_threshold",
            DecisionReason::RoiBelowThreshold => "roi_below_threshold",
            DecisionReason::RankAboveThreshold => "rank_above_threshold",
            DecisionReason::NoCompetitivePrice => "no_competitive_price",
            DecisionReason::DegradedInputs => "degraded_inputs",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the profit evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub selling_price: Decimal,
    pub total_cost: Decimal,
    pub profit: Decimal,
    /// profit / purchase cost
    pub roi: Decimal,
    /// profit / selling price
    pub margin: Decimal,
    pub purchase_recommended: bool,
    /// Thresholds that were not met, in check order.
    pub reasons: Vec<DecisionReason>,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @ {} (profit {}, roi {}, margin {})",
            if self.purchase_recommended { "BUY" } else { "PASS" },
            self.selling_price,
            self.profit,
            self.roi,
            self.margin,
        )
    }
}

// ---------------------------------------------------------------------------
// Service flags
// ---------------------------------------------------------------------------

/// How a piece of market data was obtained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceFlags {
    pub degraded: bool,
    pub cached: bool,
    pub circuit_open: bool,
    pub reason: Option<String>,
}

impl ServiceFlags {
    pub fn cached() -> Self {
        Self {
            cached: true,
            ..Self::default()
        }
    }

    pub fn degraded(reason: &str) -> Self {
        Self {
            degraded: true,
            reason: Some(reason.to_string()),
            ..Self::default()
        }
    }

    /// OR the booleans together; the other side's reason wins when present.
    pub fn merge(&self, other: &ServiceFlags) -> ServiceFlags {
        ServiceFlags {
            degraded: self.degraded || other.degraded,
            cached: self.cached || other.cached,
            circuit_open: self.circuit_open || other.circuit_open,
            reason: other.reason.clone().or_else(|| self.reason.clone()),
        }
    }
}

/// Data plus the flags describing how it was obtained.
#[derive(Debug, Clone)]
pub struct ServiceResult<T> {
    pub data: Option<T>,
    pub flags: ServiceFlags,
}

impl<T> ServiceResult<T> {
    pub fn fresh(data: T) -> Self {
        Self {
            data: Some(data),
            flags: ServiceFlags::default(),
        }
    }

    pub fn missing(flags: ServiceFlags) -> Self {
        Self { data: None, flags }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for SEDORI.
#[derive(Debug, thiserror::Error)]
pub enum SedoriError {
    #[error("Division undefined: {quantity} has a zero denominator")]
    DivisionUndefined { quantity: &'static str },

    #[error("Arithmetic overflow computing {quantity}")]
    Overflow { quantity: &'static str },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
