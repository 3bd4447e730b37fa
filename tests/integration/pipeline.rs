//! End-to-end appraisal scenarios: buy, no-buy by rank, degraded inputs,
//! caching and the bundled fixtures.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;

use sedori::config::{AppConfig, MoneyConfig};
use sedori::data::file::FileQuoteSource;
use sedori::data::{QuoteSource, SourceError};
use sedori::engine::appraiser::{AppraisalRequest, Appraiser};
use sedori::engine::report::AppraisalReport;
use sedori::engine::resilience::{ResilienceSettings, ResilientSource, RetryPolicy};
use sedori::sinks::JsonFileSink;
use sedori::types::{CostInputs, ProductQuery, Thresholds};

use crate::mock_source::{quote, InMemorySource, MockQuotes};

const MAX_RETRIES: u32 = 2;

fn fast_settings() -> ResilienceSettings {
    ResilienceSettings {
        retry: RetryPolicy {
            max_retries: MAX_RETRIES,
            base: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        },
        ..ResilienceSettings::default()
    }
}

fn thresholds() -> Thresholds {
    Thresholds {
        min_profit: dec!(500),
        min_roi: dec!(0.2),
        max_rank: Some(50_000),
    }
}

fn appraiser<S: QuoteSource>(source: S) -> Appraiser<S> {
    Appraiser::new(ResilientSource::new(source, fast_settings()), thresholds(), MoneyConfig::default())
}

fn asin_request(asin: &str, purchase: Decimal, fba: Decimal) -> AppraisalRequest {
    let query = ProductQuery::new(Some(asin.to_string()), None).unwrap();
    AppraisalRequest::new(query, CostInputs::new(purchase, Decimal::ZERO, Decimal::ZERO, fba))
}

fn manifest_path(rel: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(rel)
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_profitable_fast_seller_is_bought() {
    let dir = tempfile::tempdir().unwrap();
    let decision_path = dir.path().join("decision.json");
    let a = appraiser(InMemorySource::new()).with_report_sink(Box::new(JsonFileSink::new(&decision_path)));

    let report = a.appraise(asin_request("B000GOOD01", dec!(2400), dec!(1400))).await.unwrap();

    assert!(report.decision.buy);
    assert!(report.decision.profitable);
    assert_eq!(report.decision.primary_reason(), "thresholds_met");
    let calc = report.calc.as_ref().unwrap();
    assert_eq!(calc.profit, dec!(1000.00));
    assert_eq!(calc.roi, dec!(0.4167));
    assert_eq!(
        report.summary_line(dec!(0.01)),
        "ASIN: B000GOOD01 | ¥4800.00 | profit ¥1000.00 | ROI 41.7% | reason: thresholds_met"
    );

    let history = report.source.history.as_ref().unwrap();
    assert_eq!(history.points, 5);
    assert_eq!(history.latest, dec!(4850.00));

    let written: AppraisalReport =
        serde_json::from_str(&std::fs::read_to_string(&decision_path).unwrap()).unwrap();
    assert_eq!(written.request_id, report.request_id);
}

#[tokio::test]
async fn test_slow_seller_is_rejected_by_rank() {
    let dir = tempfile::tempdir().unwrap();
    let decision_path = dir.path().join("decision.json");
    let a = appraiser(InMemorySource::new()).with_report_sink(Box::new(JsonFileSink::new(&decision_path)));

    let report = a.appraise(asin_request("B000SLOW01", dec!(2400), dec!(1400))).await.unwrap();

    assert!(!report.decision.buy);
    assert!(report.decision.profitable);
    assert!(!report.decision.recommended);
    assert_eq!(report.decision.reasons, vec!["rank_above_threshold".to_string()]);

    // The decision file records no-buys too
    let written: AppraisalReport =
        serde_json::from_str(&std::fs::read_to_string(&decision_path).unwrap()).unwrap();
    assert!(!written.decision.buy);
}

#[tokio::test]
async fn test_no_offers_is_never_bought() {
    let a = appraiser(InMemorySource::new());
    let report = a.appraise(asin_request("B000NOOFFR", dec!(1000), dec!(0))).await.unwrap();

    assert!(!report.decision.buy);
    assert!(report.calc.is_none());
    assert!(report.decision.reasons.contains(&"no_competitive_price".to_string()));
    assert!(!report.flags.degraded);
}

#[tokio::test]
async fn test_barcode_lookup_with_thin_history() {
    let a = appraiser(InMemorySource::new());
    let query = ProductQuery::new(None, Some("4901234567894".into())).unwrap();
    let request = AppraisalRequest::new(query, CostInputs::new(dec!(1000), dec!(0), dec!(0), dec!(0)));

    let report = a.appraise(request).await.unwrap();

    // 980 profit, 98% ROI: thresholds pass, the thin history is advisory only
    assert!(report.decision.buy);
    assert_eq!(report.decision.reasons, vec!["price_history_sparse".to_string()]);
    assert_eq!(report.identifier, "4901234567894");
    assert_eq!(report.decision.primary_reason(), "thresholds_met");
}

// ---------------------------------------------------------------------------
// Degraded inputs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_failing_source_degrades_then_opens_circuit() {
    let source = InMemorySource::new();
    source.set_error("503 from upstream");
    let calls = source.call_counter();
    let a = appraiser(source);

    let report = a.appraise(asin_request("B000GOOD01", dec!(2400), dec!(1400))).await.unwrap();
    assert!(!report.decision.buy);
    assert!(report.flags.degraded);
    assert_eq!(report.flags.reason.as_deref(), Some("retry_exhausted"));
    assert!(report.decision.reasons.contains(&"degraded_inputs".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), (MAX_RETRIES + 1) as usize);

    // Two more exhausted fetches trip the breaker (threshold 3)
    a.appraise(asin_request("B000GOOD01", dec!(2400), dec!(1400))).await.unwrap();
    a.appraise(asin_request("B000GOOD01", dec!(2400), dec!(1400))).await.unwrap();
    let before = calls.load(Ordering::SeqCst);

    let report = a.appraise(asin_request("B000GOOD01", dec!(2400), dec!(1400))).await.unwrap();
    assert!(report.flags.circuit_open);
    assert!(report.decision.reasons.contains(&"circuit_open".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), before);
}

#[tokio::test]
async fn test_transient_failure_recovers_within_retries() {
    let source = InMemorySource::new();
    source.set_error("blip");
    let switch = source.error_switch();
    let calls = source.call_counter();
    let watcher = calls.clone();

    let settings = ResilienceSettings {
        retry: RetryPolicy {
            max_retries: 5,
            base: Duration::from_millis(20),
            max_backoff: Duration::from_millis(20),
        },
        ..ResilienceSettings::default()
    };
    let a = Appraiser::new(ResilientSource::new(source, settings), thresholds(), MoneyConfig::default());

    // Clear the error while the first retry is backing off
    let clear = tokio::spawn(async move {
        while watcher.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        *switch.lock().unwrap() = None;
    });

    let report = a.appraise(asin_request("B000GOOD01", dec!(2400), dec!(1400))).await.unwrap();
    clear.await.unwrap();

    assert!(report.decision.buy);
    assert!(!report.flags.degraded);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unknown_product_is_degraded_not_fatal() {
    let a = appraiser(InMemorySource::new());
    let report = a.appraise(asin_request("B000UNKNWN", dec!(1000), dec!(0))).await.unwrap();
    assert!(!report.decision.buy);
    assert_eq!(report.flags.reason.as_deref(), Some("quote_not_found"));
}

// ---------------------------------------------------------------------------
// Mocked source
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_second_appraisal_is_served_from_cache() {
    let mut mock = MockQuotes::new();
    mock.expect_name().return_const("mock".to_string());
    mock.expect_fetch_quote()
        .withf(|q| q.identifier() == "B000MOCK01")
        .times(1)
        .returning(|_| Ok(quote("B000MOCK01", dec!(3000), 500, &[2900, 3000, 3100])));
    let a = appraiser(mock);

    let first = a.appraise(asin_request("B000MOCK01", dec!(1500), dec!(300))).await.unwrap();
    assert!(!first.flags.cached);

    let second = a.appraise(asin_request("B000MOCK01", dec!(1500), dec!(300))).await.unwrap();
    assert!(second.flags.cached);
    assert_eq!(second.calc, first.calc);
    assert!(second.decision.buy);
}

#[tokio::test]
async fn test_rejected_request_is_not_retried() {
    let mut mock = MockQuotes::new();
    mock.expect_name().return_const("mock".to_string());
    mock.expect_fetch_quote().times(1).returning(|_| {
        Err(SourceError::Rejected {
            source_name: "mock".into(),
            message: "401 unauthorized".into(),
        })
    });
    let a = appraiser(mock);

    let report = a.appraise(asin_request("B000MOCK01", dec!(1500), dec!(0))).await.unwrap();
    assert!(!report.decision.buy);
    assert_eq!(report.flags.reason.as_deref(), Some("source_error"));
}

// ---------------------------------------------------------------------------
// Bundled fixtures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_fixture_quotes_with_dev_config() {
    let cfg = AppConfig::load(manifest_path("config/settings.toml"), Some("dev")).unwrap();
    let source = FileQuoteSource::new(manifest_path("fixtures/quotes.json"));
    let dir = tempfile::tempdir().unwrap();
    let decision_path = dir.path().join("decision.json");
    let a = Appraiser::new(ResilientSource::new(source, cfg.resilience()), cfg.thresholds.clone(), cfg.money.clone())
        .with_report_sink(Box::new(JsonFileSink::new(&decision_path)));

    let mut request = asin_request("B00EXAMPLE", dec!(2400), dec!(450));
    request.dry_run = true;
    let report = a.appraise(request).await.unwrap();
    assert!(decision_path.exists());

    assert_eq!(report.source.name, "file");
    assert_eq!(report.source.competitor_price, Some(dec!(4800)));
    assert!(report.calc.is_some());
    assert!(report.dry_run);
}
