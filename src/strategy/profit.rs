//! Profit evaluation.
//!
//! Turns a price quote, the caller's costs and the configured thresholds
//! into a purchase decision. Pure and deterministic: no I/O, no state.

use rust_decimal::Decimal;
use tracing::debug;

use super::money::{quantize_money, quantize_ratio};
use crate::types::{CostInputs, Decision, DecisionReason, PriceQuote, SedoriError, Thresholds};

/// Evaluate a prospective purchase.
///
/// The selling price is `target_price` when given, otherwise the quote's
/// competitor price. ROI is taken against the purchase cost and margin
/// against the selling price, so either being zero is an error. Amounts
/// whose sums leave the `Decimal` range fail with `Overflow`.
pub fn evaluate(
    quote: &PriceQuote,
    costs: &CostInputs,
    thresholds: &Thresholds,
    target_price: Option<Decimal>,
) -> Result<Decision, SedoriError> {
    let selling_price = target_price.unwrap_or(quote.competitor_price);
    let total_cost = costs.total()?;
    let profit = selling_price
        .checked_sub(total_cost)
        .ok_or(SedoriError::Overflow { quantity: "profit" })?;

    let roi = ratio(profit, costs.purchase_cost, "roi")?;
    let margin = ratio(profit, selling_price, "margin")?;

    let mut reasons = Vec::new();
    if profit < thresholds.min_profit {
        reasons.push(DecisionReason::ProfitBelowThreshold);
    }
    if roi < thresholds.min_roi {
        reasons.push(DecisionReason::RoiBelowThreshold);
    }
    if !rank_within(quote.sales_rank, thresholds.max_rank) {
        reasons.push(DecisionReason::RankAboveThreshold);
    }
    let purchase_recommended = reasons.is_empty();

    debug!(
        identifier = %quote.identifier,
        selling_price = %selling_price,
        profit = %profit,
        roi = %roi,
        rank = quote.sales_rank,
        recommended = purchase_recommended,
        "Evaluated purchase"
    );

    Ok(Decision {
        selling_price,
        total_cost,
        profit,
        roi,
        margin,
        purchase_recommended,
        reasons,
    })
}

fn ratio(numerator: Decimal, denominator: Decimal, quantity: &'static str) -> Result<Decimal, SedoriError> {
    if denominator.is_zero() {
        return Err(SedoriError::DivisionUndefined { quantity });
    }
    numerator
        .checked_div(denominator)
        .ok_or(SedoriError::DivisionUndefined { quantity })
}

fn rank_within(rank: u64, max_rank: Option<u64>) -> bool {
    max_rank.map_or(true, |max| rank <= max)
}

impl Decision {
    /// Display copy with money rounded to `quantum` and ratios to 4 dp.
    pub fn quantized(&self, quantum: Decimal) -> Decision {
        Decision {
            selling_price: quantize_money(self.selling_price, quantum),
            total_cost: quantize_money(self.total_cost, quantum),
            profit: quantize_money(self.profit, quantum),
            roi: quantize_ratio(self.roi),
            margin: quantize_ratio(self.margin),
            purchase_recommended: self.purchase_recommended,
            reasons: self.reasons.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
