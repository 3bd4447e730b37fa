//! Final buy/no-buy verdict.
//!
//! The evaluator only looks at thresholds. The verdict additionally refuses
//! to buy on a loss or on degraded inputs, and collects every reason into a
//! sorted, de-duplicated list for the report.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::types::{Decision, DecisionReason, ServiceFlags};

/// Advisory note when fewer than two prices back the history summary.
pub const NOTE_HISTORY_SPARSE: &str = "price_history_sparse";

/// Reasons reported for information only; they never explain a verdict.
const ADVISORY_NOTES: &[&str] = &[NOTE_HISTORY_SPARSE];

/// Input-quality facts gathered while assembling the evaluation.
#[derive(Debug, Clone, Default)]
pub struct InputQuality {
    pub flags: ServiceFlags,
    /// The quote carried no competitor price.
    pub missing_price: bool,
    /// Advisory reasons that do not block a purchase.
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub buy: bool,
    pub profitable: bool,
    pub recommended: bool,
    pub reasons: Vec<String>,
}

impl Verdict {
    /// First reason that is not an advisory note, or `thresholds_met`.
    pub fn primary_reason(&self) -> &str {
        self.reasons
            .iter()
            .map(String::as_str)
            .find(|r| !ADVISORY_NOTES.contains(r))
            .unwrap_or("thresholds_met")
    }
}

pub fn verdict(decision: &Decision, quality: &InputQuality) -> Verdict {
    let mut reasons: BTreeSet<String> = decision.reasons.iter().map(|r| r.to_string()).collect();
    collect_quality_reasons(quality, &mut reasons);

    let profitable = decision.profit > Decimal::ZERO;
    let buy = decision.purchase_recommended && profitable && !quality.flags.degraded && !quality.missing_price;

    Verdict {
        buy,
        profitable,
        recommended: decision.purchase_recommended,
        reasons: reasons.into_iter().collect(),
    }
}

/// Verdict for an appraisal with no selling price to evaluate against.
pub fn unpriced(quality: &InputQuality) -> Verdict {
    let mut reasons = BTreeSet::new();
    reasons.insert(DecisionReason::NoCompetitivePrice.to_string());
    collect_quality_reasons(quality, &mut reasons);

    Verdict {
        buy: false,
        profitable: false,
        recommended: false,
        reasons: reasons.into_iter().collect(),
    }
}

fn collect_quality_reasons(quality: &InputQuality, reasons: &mut BTreeSet<String>) {
    if quality.missing_price {
        reasons.insert(DecisionReason::NoCompetitivePrice.to_string());
    }
    if quality.flags.degraded {
        reasons.insert(DecisionReason::DegradedInputs.to_string());
    }
    if let Some(reason) = &quality.flags.reason {
        reasons.insert(reason.clone());
    }
    reasons.extend(quality.notes.iter().cloned());
}
