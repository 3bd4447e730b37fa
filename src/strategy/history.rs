//! 30-day price history summary.
//!
//! Reduces a quote's price history to the figures a buyer looks at before
//! committing: the latest observed price and the spread of recent prices.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::money::quantize_money;
use crate::types::PricePoint;

/// Length of the look-back window in days.
pub const WINDOW_DAYS: i64 = 30;

/// Fewer points than this in the window marks the summary insufficient.
pub const MIN_WINDOW_POINTS: usize = 2;

const PRICE_QUANTUM: Decimal = dec!(0.01);

/// Summary statistics over the look-back window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSummary {
    /// Most recent positive price in the whole history.
    pub latest: Decimal,
    pub median: Decimal,
    pub p10: Decimal,
    pub p90: Decimal,
    /// Number of prices the statistics were computed from.
    pub points: usize,
    /// True when the window held fewer than [`MIN_WINDOW_POINTS`] prices.
    pub insufficient: bool,
}

/// Summarise `history` relative to `as_of`.
///
/// Returns `None` when the history holds no positive price at all. If the
/// window is empty, statistics fall back to every positive price.
pub fn summarize(history: &[PricePoint], as_of: DateTime<Utc>) -> Option<PriceSummary> {
    let cutoff = as_of - Duration::days(WINDOW_DAYS);
    let positive = || history.iter().filter(|p| p.price > Decimal::ZERO);

    let mut window: Vec<Decimal> = positive()
        .filter(|p| p.date >= cutoff && p.date <= as_of)
        .map(|p| p.price)
        .collect();
    let insufficient = window.len() < MIN_WINDOW_POINTS;

    if window.is_empty() {
        window = positive().map(|p| p.price).collect();
    }
    if window.is_empty() {
        return None;
    }
    window.sort();

    let latest = positive()
        .max_by_key(|p| p.date)
        .map(|p| p.price)
        .unwrap_or(window[window.len() - 1]);

    Some(PriceSummary {
        latest: quantize_money(latest, PRICE_QUANTUM),
        median: median(&window),
        p10: percentile(&window, dec!(0.10)),
        p90: percentile(&window, dec!(0.90)),
        points: window.len(),
        insufficient,
    })
}

/// Median of an ascending slice; the mean of the middle pair for even counts.
fn median(sorted: &[Decimal]) -> Decimal {
    let n = sorted.len();
    let mid = n / 2;
    let value = if n % 2 == 1 {
        sorted[mid]
    } else {
        sorted[mid - 1] + (sorted[mid] - sorted[mid - 1]) / dec!(2)
    };
    quantize_money(value, PRICE_QUANTUM)
}

/// Linear-interpolated percentile of an ascending, non-empty slice.
fn percentile(sorted: &[Decimal], pct: Decimal) -> Decimal {
    if sorted.len() == 1 {
        return quantize_money(sorted[0], PRICE_QUANTUM);
    }
    let rank = Decimal::from(sorted.len() - 1) * pct;
    let lower = rank.floor();
    let fraction = rank - lower;
    let lower_idx = lower.to_usize().unwrap_or(0);
    let upper_idx = (lower_idx + 1).min(sorted.len() - 1);
    let value = sorted[lower_idx] + (sorted[upper_idx] - sorted[lower_idx]) * fraction;
    quantize_money(value, PRICE_QUANTUM)
}
