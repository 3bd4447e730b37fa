//! Machine-readable appraisal report.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::strategy::history::PriceSummary;
use crate::strategy::money::{format_currency, format_ratio_pct};
use crate::strategy::verdict::Verdict;
use crate::types::{FeeBreakdown, ServiceFlags, Thresholds};

/// Caller-supplied inputs, echoed back verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportInputs {
    pub asin: Option<String>,
    pub barcode: Option<String>,
    pub purchase_cost: Decimal,
    pub shipping_fees: Decimal,
    pub taxes: Decimal,
    pub fba_fees: Decimal,
    pub target_price: Option<Decimal>,
}

/// What the quote source returned and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReport {
    pub name: String,
    pub flags: ServiceFlags,
    pub competitor_price: Option<Decimal>,
    pub sales_rank: Option<u64>,
    pub title: Option<String>,
    pub history: Option<PriceSummary>,
}

/// Quantised calculation block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalcReport {
    pub selling_price: Decimal,
    pub purchase_cost: Decimal,
    pub fees: FeeBreakdown,
    pub total_cost: Decimal,
    pub profit: Decimal,
    pub roi: Decimal,
    pub margin: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppraisalReport {
    pub request_id: String,
    pub generated_at: DateTime<Utc>,
    /// Identifier the appraisal was keyed on (ASIN, else barcode).
    pub identifier: String,
    pub currency: String,
    pub inputs: ReportInputs,
    pub source: SourceReport,
    /// Absent when there was no selling price to evaluate against.
    pub calc: Option<CalcReport>,
    pub thresholds: Thresholds,
    pub flags: ServiceFlags,
    pub decision: Verdict,
    pub dry_run: bool,
}

impl AppraisalReport {
    /// One-line human summary used by notification-style sinks.
    pub fn summary_line(&self, quantum: Decimal) -> String {
        let (price, profit, roi) = match &self.calc {
            Some(calc) => (
                format_currency(calc.selling_price, &self.currency, quantum),
                format_currency(calc.profit, &self.currency, quantum),
                format_ratio_pct(calc.roi),
            ),
            None => ("n/a".to_string(), "n/a".to_string(), "n/a".to_string()),
        };
        format!(
            "ASIN: {} | {} | profit {} | ROI {} | reason: {}",
            self.identifier,
            price,
            profit,
            roi,
            self.decision.primary_reason()
        )
    }
}
