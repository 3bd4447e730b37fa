//! Appraisal pipeline.
//!
//! One appraisal: fetch a quote through the resilience layer, summarise its
//! price history, derive the configured extra cost lines, run the profit
//! evaluator and build the verdict. Report sinks receive every report;
//! notification sinks only hear about a buy outside dry-run mode.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::report::{AppraisalReport, CalcReport, ReportInputs, SourceReport};
use super::resilience::ResilientSource;
use crate::config::MoneyConfig;
use crate::data::{QuoteSource, SourceError};
use crate::sinks::{deliver_all, DecisionSink};
use crate::strategy::history::summarize;
use crate::strategy::money::{basis_points, expected_return_cost, quantize_money};
use crate::strategy::profit::evaluate;
use crate::strategy::verdict::{self, InputQuality};
use crate::types::{
    CostInputs, FeeBreakdown, PriceQuote, ProductQuery, SedoriError, ServiceFlags, ServiceResult, Thresholds,
};

pub use crate::strategy::verdict::NOTE_HISTORY_SPARSE;

pub const REASON_QUOTE_NOT_FOUND: &str = "quote_not_found";
pub const REASON_SOURCE_ERROR: &str = "source_error";

#[derive(Debug, thiserror::Error)]
pub enum AppraisalError {
    #[error(transparent)]
    Domain(#[from] SedoriError),

    #[error("Quote source failed: {0}")]
    Source(#[from] SourceError),
}

/// Everything the caller supplies for one appraisal.
#[derive(Debug, Clone)]
pub struct AppraisalRequest {
    pub query: ProductQuery,
    /// Caller costs; derived fee lines are added by the appraiser.
    pub costs: CostInputs,
    /// Ignored unless positive.
    pub target_price: Option<Decimal>,
    /// Generated when absent.
    pub request_id: Option<String>,
    /// Skip notification sinks.
    pub dry_run: bool,
}

impl AppraisalRequest {
    pub fn new(query: ProductQuery, costs: CostInputs) -> Self {
        Self {
            query,
            costs,
            target_price: None,
            request_id: None,
            dry_run: false,
        }
    }

    fn validate(&self) -> Result<(), SedoriError> {
        if self.query.asin.is_none() && self.query.barcode.is_none() {
            return Err(SedoriError::InvalidQuery("either asin or barcode must be provided".into()));
        }
        let c = &self.costs;
        for (name, value) in [
            ("purchase_cost", c.purchase_cost),
            ("shipping_fees", c.shipping_fees),
            ("taxes", c.taxes),
            ("fba_fees", c.fba_fees),
        ] {
            if value < Decimal::ZERO {
                return Err(SedoriError::InvalidQuery(format!("{name} must not be negative")));
            }
        }
        Ok(())
    }
}

pub struct Appraiser<S: QuoteSource> {
    source: ResilientSource<S>,
    thresholds: Thresholds,
    money: MoneyConfig,
    report_sinks: Vec<Box<dyn DecisionSink>>,
    sinks: Vec<Box<dyn DecisionSink>>,
}

impl<S: QuoteSource> Appraiser<S> {
    pub fn new(source: ResilientSource<S>, thresholds: Thresholds, money: MoneyConfig) -> Self {
        Self {
            source,
            thresholds,
            money,
            report_sinks: Vec::new(),
            sinks: Vec::new(),
        }
    }

    /// Notification sink: receives buy decisions outside dry-run mode.
    pub fn with_sink(mut self, sink: Box<dyn DecisionSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Report sink: receives every report, dry run or not.
    pub fn with_report_sink(mut self, sink: Box<dyn DecisionSink>) -> Self {
        self.report_sinks.push(sink);
        self
    }

    pub fn source(&self) -> &ResilientSource<S> {
        &self.source
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Run one appraisal inside an `appraisal` span.
    pub async fn appraise(&self, request: AppraisalRequest) -> Result<AppraisalReport, AppraisalError> {
        let request_id = request
            .request_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let span = info_span!(
            "appraisal",
            request_id = %request_id,
            identifier = %request.query.identifier()
        );
        self.run(request, request_id).instrument(span).await
    }

    async fn run(&self, request: AppraisalRequest, request_id: String) -> Result<AppraisalReport, AppraisalError> {
        request.validate()?;
        let identifier = request.query.identifier().to_string();
        let quantum = self.money.rounding;
        let target_price = request.target_price.filter(|t| *t > Decimal::ZERO);

        // Quote
        let fetched = self.fetch(&request.query).await?;
        let source_flags = fetched.flags.clone();
        let quote = fetched
            .data
            .unwrap_or_else(|| PriceQuote::unavailable(&identifier));
        let have_quote = !source_flags.degraded;

        // History
        let history = summarize(&quote.price_history, Utc::now());
        let mut notes = Vec::new();
        if history.as_ref().map_or(true, |h| h.insufficient) {
            notes.push(NOTE_HISTORY_SPARSE.to_string());
        }

        // Fees
        let selling_price = target_price.unwrap_or(quote.competitor_price);
        let fees = self.fee_breakdown(&request.costs, selling_price)?;
        let costs = request.costs.clone().with_extra_fees(fees.derived_total()?);

        let quality = InputQuality {
            flags: source_flags.clone(),
            missing_price: quote.competitor_price <= Decimal::ZERO,
            notes,
        };

        // Evaluation
        let (calc, verdict) = if selling_price > Decimal::ZERO {
            let decision = evaluate(&quote, &costs, &self.thresholds, target_price)?;
            let shown = decision.quantized(quantum);
            let calc = CalcReport {
                selling_price: shown.selling_price,
                purchase_cost: quantize_money(costs.purchase_cost, quantum),
                fees: fees.map(|v| quantize_money(v, quantum)),
                total_cost: shown.total_cost,
                profit: shown.profit,
                roi: shown.roi,
                margin: shown.margin,
            };
            (Some(calc), verdict::verdict(&decision, &quality))
        } else {
            if costs.purchase_cost.is_zero() {
                return Err(SedoriError::DivisionUndefined { quantity: "roi" }.into());
            }
            debug!("No selling price available, skipping evaluation");
            (None, verdict::unpriced(&quality))
        };

        info!(
            buy = verdict.buy,
            profitable = verdict.profitable,
            reason = verdict.primary_reason(),
            degraded = source_flags.degraded,
            cached = source_flags.cached,
            "Appraisal complete"
        );

        let report = AppraisalReport {
            request_id,
            generated_at: Utc::now(),
            identifier,
            currency: self.money.currency.clone(),
            inputs: ReportInputs {
                asin: request.query.asin.clone(),
                barcode: request.query.barcode.clone(),
                purchase_cost: request.costs.purchase_cost,
                shipping_fees: request.costs.shipping_fees,
                taxes: request.costs.taxes,
                fba_fees: request.costs.fba_fees,
                target_price: request.target_price,
            },
            source: SourceReport {
                name: self.source.source().name().to_string(),
                flags: source_flags.clone(),
                competitor_price: have_quote.then_some(quote.competitor_price),
                sales_rank: have_quote.then_some(quote.sales_rank),
                title: quote.title.clone(),
                history,
            },
            calc,
            thresholds: self.thresholds.clone(),
            flags: ServiceFlags::default().merge(&source_flags),
            decision: verdict,
            dry_run: request.dry_run,
        };

        if !self.report_sinks.is_empty() {
            let failures = deliver_all(&self.report_sinks, &report).await;
            debug!(sinks = self.report_sinks.len(), failures, "Delivered report");
        }
        if report.decision.buy && !request.dry_run && !self.sinks.is_empty() {
            let failures = deliver_all(&self.sinks, &report).await;
            debug!(sinks = self.sinks.len(), failures, "Sent buy notifications");
        }

        Ok(report)
    }

    /// Fetch through the resilience layer. Source failures other than a
    /// local I/O error degrade to an empty result.
    async fn fetch(&self, query: &ProductQuery) -> Result<ServiceResult<PriceQuote>, AppraisalError> {
        match self.source.fetch(query).await {
            Ok(result) => Ok(result),
            Err(e @ SourceError::Io { .. }) => Err(e.into()),
            Err(SourceError::NotFound(id)) => {
                warn!(identifier = %id, "No quote for product");
                Ok(ServiceResult::missing(ServiceFlags::degraded(REASON_QUOTE_NOT_FOUND)))
            }
            Err(e) => {
                warn!(error = %e, "Quote source failed");
                Ok(ServiceResult::missing(ServiceFlags::degraded(REASON_SOURCE_ERROR)))
            }
        }
    }

    fn fee_breakdown(&self, costs: &CostInputs, selling_price: Decimal) -> Result<FeeBreakdown, SedoriError> {
        let fx_spread = basis_points(selling_price, self.money.fx_spread_bp)
            .ok_or(SedoriError::Overflow { quantity: "fx_spread" })?;
        let returns_cost = expected_return_cost(selling_price, self.money.return_rate)
            .ok_or(SedoriError::Overflow { quantity: "returns_cost" })?;
        Ok(FeeBreakdown {
            shipping_fees: costs.shipping_fees,
            taxes: costs.taxes,
            fba_fees: costs.fba_fees,
            inbound_shipping: self.money.inbound_shipping,
            packaging_materials: self.money.packaging_materials,
            storage_fee: self.money.storage_fee_monthly,
            fx_spread,
            returns_cost,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
