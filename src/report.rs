//! Saved-results document for a finished run.

use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::proof::ValidationOutcome;
use crate::run::ValidationRun;
use crate::stats::Statistics;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("report JSON is invalid: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub cancelled: bool,
    /// Relays in the input batch, including any never reached after a cancel.
    pub total_relays: usize,
    pub valid_relays: usize,
    /// Every completed relay that is not valid, errors included.
    pub invalid_relays: usize,
    pub success_rate: f64,
}

/// `{metadata, statistics, results}` as written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub metadata: ReportMetadata,
    pub statistics: Statistics,
    pub results: Vec<ValidationOutcome>,
}

impl RunReport {
    pub fn from_run(run: &ValidationRun) -> Self {
        let overall = &run.statistics.overall;
        Self {
            metadata: ReportMetadata {
                started_at: run.started_at,
                finished_at: run.finished_at,
                cancelled: run.cancelled,
                total_relays: run.total,
                valid_relays: overall.valid,
                invalid_relays: overall.total - overall.valid,
                success_rate: overall.success_rate,
            },
            statistics: run.statistics.clone(),
            results: run.outcomes.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ReportError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn read_json(path: impl AsRef<Path>) -> Result<Self, ReportError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

impl From<&ValidationRun> for RunReport {
    fn from(run: &ValidationRun) -> Self {
        Self::from_run(run)
    }
}
