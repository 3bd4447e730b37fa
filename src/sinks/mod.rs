//! Decision sinks.
//!
//! Report sinks receive every appraisal report; notification sinks only
//! receive buys outside dry-run mode. The crate ships a log sink (one-line
//! summary through `tracing`) used for notifications and a JSON file sink
//! used for the decision file. Spreadsheet or chat integrations plug in
//! behind the same trait.

use async_trait::async_trait;
use futures::future::join_all;
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::engine::report::AppraisalReport;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Destination for appraisal reports.
#[async_trait]
pub trait DecisionSink: Send + Sync {
    async fn deliver(&self, report: &AppraisalReport) -> Result<(), SinkError>;

    fn name(&self) -> &str;
}

/// Deliver `report` to every sink concurrently. Failures are logged and
/// counted, never propagated.
pub async fn deliver_all(sinks: &[Box<dyn DecisionSink>], report: &AppraisalReport) -> usize {
    let results = join_all(sinks.iter().map(|sink| sink.deliver(report))).await;

    let mut failures = 0;
    for (sink, result) in sinks.iter().zip(results) {
        if let Err(e) = result {
            failures += 1;
            warn!(sink = sink.name(), request_id = %report.request_id, error = %e, "Sink delivery failed");
        }
    }
    failures
}

// ---------------------------------------------------------------------------
// Log sink
// ---------------------------------------------------------------------------

/// Emits the one-line summary at info level.
pub struct LogSink {
    quantum: Decimal,
}

impl LogSink {
    pub fn new(quantum: Decimal) -> Self {
        Self { quantum }
    }
}

#[async_trait]
impl DecisionSink for LogSink {
    async fn deliver(&self, report: &AppraisalReport) -> Result<(), SinkError> {
        info!(
            request_id = %report.request_id,
            buy = report.decision.buy,
            "{}",
            report.summary_line(self.quantum)
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

// ---------------------------------------------------------------------------
// JSON file sink
// ---------------------------------------------------------------------------

/// Writes the pretty-printed report to a fixed path, replacing any
/// previous contents.
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> SinkError {
        SinkError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl DecisionSink for JsonFileSink {
    async fn deliver(&self, report: &AppraisalReport) -> Result<(), SinkError> {
        let json = serde_json::to_string_pretty(report)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| self.io_error(e))?;
        info!(path = %self.path.display(), "Wrote decision file");
        Ok(())
    }

    fn name(&self) -> &str {
        "json_file"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
