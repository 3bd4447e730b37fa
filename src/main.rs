//! SEDORI: retail-arbitrage profit appraiser.
//!
//! Entry point. Parses the command line, loads configuration, initialises
//! structured logging, appraises one product and prints the report as JSON
//! on stdout. Logs go to stderr.

use anyhow::{bail, Context, Result};
use clap::Parser;
use rust_decimal::Decimal;
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use sedori::config::{self, AppConfig, SourceKind};
use sedori::data::file::FileQuoteSource;
use sedori::data::http::HttpQuoteSource;
use sedori::data::QuoteSource;
use sedori::engine::appraiser::{AppraisalRequest, Appraiser};
use sedori::engine::resilience::ResilientSource;
use sedori::sinks::{JsonFileSink, LogSink};
use sedori::types::{CostInputs, ProductQuery};

#[derive(Parser, Debug)]
#[command(name = "sedori")]
#[command(about = "Appraise a product for resale: profit, ROI and a buy/no-buy verdict")]
struct Cli {
    /// Marketplace ASIN
    #[arg(long)]
    asin: Option<String>,

    /// JAN/EAN barcode, used when no ASIN is given
    #[arg(long)]
    barcode: Option<String>,

    #[arg(long)]
    purchase_cost: Decimal,

    #[arg(long, default_value = "0")]
    shipping_fees: Decimal,

    #[arg(long, default_value = "0")]
    taxes: Decimal,

    #[arg(long, default_value = "0")]
    fba_fees: Decimal,

    /// Sell at this price instead of the lowest competitor price
    #[arg(long)]
    target_price: Option<Decimal>,

    /// Environment overlay name (config/env/<NAME>.toml)
    #[arg(long, env = "SEDORI_ENV")]
    env: Option<String>,

    /// Log level when RUST_LOG is unset (overrides the config)
    #[arg(long)]
    log_level: Option<String>,

    /// Pretty-print the JSON report
    #[arg(long)]
    pretty: bool,

    #[arg(long, env = "SEDORI_CONFIG")]
    config: Option<PathBuf>,

    /// Quote file for the file source (overrides source.path)
    #[arg(long)]
    quote_file: Option<PathBuf>,

    /// Evaluate without sending buy notifications
    #[arg(long)]
    dry_run: bool,

    /// Write every report to this path, including no-buy and dry-run runs
    #[arg(long)]
    decision_path: Option<PathBuf>,

    #[arg(long)]
    request_id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    let cfg = load_config(&cli)?;

    init_logging(&cfg, cli.log_level.as_deref());
    info!(
        env = cli.env.as_deref().unwrap_or("default"),
        source = ?cfg.source.kind,
        min_profit = %cfg.thresholds.min_profit,
        min_roi = %cfg.thresholds.min_roi,
        max_rank = ?cfg.thresholds.max_rank,
        "SEDORI starting up"
    );

    let query = ProductQuery::new(cli.asin.clone(), cli.barcode.clone())?;
    let costs = CostInputs::new(cli.purchase_cost, cli.shipping_fees, cli.taxes, cli.fba_fees);

    let source = build_source(&cfg, cli.quote_file.as_deref())?;
    let mut appraiser = Appraiser::new(
        ResilientSource::new(source, cfg.resilience()),
        cfg.thresholds.clone(),
        cfg.money.clone(),
    );
    appraiser = appraiser.with_sink(Box::new(LogSink::new(cfg.money.rounding)));
    if let Some(path) = cli.decision_path.as_deref() {
        appraiser = appraiser.with_report_sink(Box::new(JsonFileSink::new(path)));
    }

    let request = AppraisalRequest {
        query,
        costs,
        target_price: cli.target_price,
        request_id: cli.request_id.clone(),
        dry_run: cli.dry_run,
    };
    let report = appraiser.appraise(request).await?;

    let json = if cli.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{json}");

    Ok(())
}

/// Explicit `--config` must exist; the default path falls back to built-in
/// defaults when absent.
fn load_config(cli: &Cli) -> Result<AppConfig> {
    match &cli.config {
        Some(path) => AppConfig::load(path, cli.env.as_deref()),
        None if Path::new(config::DEFAULT_CONFIG_PATH).exists() => {
            AppConfig::load(config::DEFAULT_CONFIG_PATH, cli.env.as_deref())
        }
        None => Ok(AppConfig::default()),
    }
}

fn build_source(cfg: &AppConfig, quote_file: Option<&Path>) -> Result<Box<dyn QuoteSource>> {
    if let Some(path) = quote_file {
        return Ok(Box::new(FileQuoteSource::new(path)));
    }

    match cfg.source.kind {
        SourceKind::File => {
            let Some(path) = cfg.source.path.as_deref() else {
                bail!("source.path must be set (or pass --quote-file) for the file source");
            };
            Ok(Box::new(FileQuoteSource::new(path)))
        }
        SourceKind::Http => {
            let base_url = cfg
                .source
                .base_url
                .as_deref()
                .context("source.base_url must be set for the http source")?;
            let api_key = match cfg.source.api_key_env.as_deref() {
                Some(env) => match AppConfig::resolve_env(env) {
                    Ok(key) => Some(SecretString::new(key)),
                    Err(e) => {
                        warn!(error = %e, "No API key for quote service, sending unauthenticated requests");
                        None
                    }
                },
                None => None,
            };
            let source = HttpQuoteSource::new(base_url, api_key, Duration::from_secs(cfg.source.timeout_secs))?;
            Ok(Box::new(source))
        }
    }
}

/// Initialise the `tracing` subscriber on stderr.
///
/// `RUST_LOG` wins, then `--log-level`, then `observability.log_level`.
/// JSON output is enabled by `observability.json_logs` or `SEDORI_LOG_JSON`.
fn init_logging(cfg: &AppConfig, cli_level: Option<&str>) {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = cli_level.unwrap_or(&cfg.observability.log_level).to_ascii_lowercase();
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sedori={level}")));

    let json_logging = cfg.observability.json_logs || std::env::var("SEDORI_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_current_span(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .init();
    }
}
