//! Configuration loading from TOML with environment overlays.
//!
//! Reads `config/settings.toml` and deserializes into strongly-typed structs.
//! An optional environment name selects `config/env/<name>.toml`, which is
//! deep-merged over the base file before deserializing. Secrets (API keys)
//! are referenced by env-var name in the config and resolved at runtime via
//! `std::env::var`.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::engine::resilience::{ResilienceSettings, RetryPolicy, DEFAULT_COOLDOWN, DEFAULT_FAILURE_THRESHOLD};
use crate::types::{SedoriError, Thresholds};

/// Default location of the base settings file.
pub const DEFAULT_CONFIG_PATH: &str = "config/settings.toml";

/// Top-level application configuration. Every section has defaults.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub thresholds: Thresholds,
    pub runtime: RuntimeConfig,
    pub cache: CacheConfig,
    pub budget: BudgetConfig,
    pub money: MoneyConfig,
    pub source: SourceConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Additional attempts after the first fetch.
    pub max_retries: u32,
    pub retry_backoff_seconds: f64,
    pub max_backoff_seconds: f64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff_seconds: 0.5,
            max_backoff_seconds: 10.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_seconds: 1800 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BudgetConfig {
    /// Quote requests allowed per process run.
    pub quotes: u32,
    pub max_inflight: usize,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            quotes: 150,
            max_inflight: 1,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MoneyConfig {
    pub currency: String,
    /// Quantum money amounts are rounded to (0.01, 1, ...).
    pub rounding: Decimal,
    /// FX spread charged on the selling price, in basis points.
    pub fx_spread_bp: u32,
    /// Expected share of units returned, as a fraction of revenue.
    pub return_rate: Decimal,
    pub storage_fee_monthly: Decimal,
    pub inbound_shipping: Decimal,
    pub packaging_materials: Decimal,
}

impl Default for MoneyConfig {
    fn default() -> Self {
        Self {
            currency: "JPY".to_string(),
            rounding: dec!(0.01),
            fx_spread_bp: 0,
            return_rate: Decimal::ZERO,
            storage_fee_monthly: Decimal::ZERO,
            inbound_shipping: Decimal::ZERO,
            packaging_materials: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    File,
    Http,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Quote file for the `file` source.
    pub path: Option<String>,
    /// Service root for the `http` source.
    pub base_url: Option<String>,
    /// Env var holding the API key for the `http` source.
    pub api_key_env: Option<String>,
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::File,
            path: None,
            base_url: None,
            api_key_env: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub json_logs: bool,
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            json_logs: false,
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file, deep-merging the overlay for
    /// `env` when one is given. A missing overlay only logs a warning.
    pub fn load(path: impl AsRef<Path>, env: Option<&str>) -> Result<Self> {
        let path = path.as_ref();
        let mut table = read_table(path)?;

        if let Some(env) = env {
            let overlay_path = overlay_path(path, env);
            if overlay_path.exists() {
                let overlay = read_table(&overlay_path)?;
                deep_merge(&mut table, overlay);
            } else {
                warn!(env, path = %overlay_path.display(), "Environment overlay not found");
            }
        }

        let config = table
            .try_into::<AppConfig>()
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the pipeline misbehave.
    pub fn validate(&self) -> Result<(), SedoriError> {
        if self.money.rounding < Decimal::ZERO {
            return Err(SedoriError::Config("money.rounding must not be negative".into()));
        }
        if self.money.return_rate < Decimal::ZERO || self.money.return_rate > Decimal::ONE {
            return Err(SedoriError::Config("money.return_rate must be within 0..=1".into()));
        }
        for (name, secs) in [
            ("runtime.retry_backoff_seconds", self.runtime.retry_backoff_seconds),
            ("runtime.max_backoff_seconds", self.runtime.max_backoff_seconds),
        ] {
            if !secs.is_finite() || secs < 0.0 {
                return Err(SedoriError::Config(format!("{name} must be a non-negative number")));
            }
        }
        if self.budget.max_inflight == 0 {
            return Err(SedoriError::Config("budget.max_inflight must be at least 1".into()));
        }
        Ok(())
    }

    /// Resilience knobs for the quote source.
    pub fn resilience(&self) -> ResilienceSettings {
        ResilienceSettings {
            retry: RetryPolicy {
                max_retries: self.runtime.max_retries,
                base: seconds(self.runtime.retry_backoff_seconds),
                max_backoff: seconds(self.runtime.max_backoff_seconds),
            },
            cache_ttl: Duration::from_secs(self.cache.ttl_seconds),
            budget_limit: self.budget.quotes,
            max_inflight: self.budget.max_inflight,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooldown: DEFAULT_COOLDOWN,
        }
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

fn seconds(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}

/// `config/settings.toml` + `dev` → `config/env/dev.toml`.
fn overlay_path(base: &Path, env: &str) -> PathBuf {
    base.parent()
        .unwrap_or_else(|| Path::new("."))
        .join("env")
        .join(format!("{env}.toml"))
}

fn read_table(path: &Path) -> Result<toml::Value> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Recursively merge `overlay` into `base`; tables merge, everything else
/// is replaced.
fn deep_merge(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                let both_tables = value.is_table() && base.get(&key).is_some_and(toml::Value::is_table);
                match base.get_mut(&key) {
                    Some(existing) if both_tables => deep_merge(existing, value),
                    _ => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
