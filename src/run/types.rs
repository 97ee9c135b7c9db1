use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::proof::ValidationOutcome;
use crate::stats::{self, Statistics};

/// A relay as supplied by the directory. Never mutated by the validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayRecord {
    /// 40 hex characters.
    pub fingerprint: String,
    #[serde(default)]
    pub nickname: String,
    /// Free-text contact field; may be empty.
    #[serde(default)]
    pub contact: String,
    #[serde(default, alias = "running")]
    pub reachable: bool,
}

impl RelayRecord {
    pub fn new(fingerprint: impl Into<String>, nickname: impl Into<String>, contact: impl Into<String>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            nickname: nickname.into(),
            contact: contact.into(),
            reachable: true,
        }
    }
}

/// Progress notification sent after each outcome is appended.
#[derive(Debug, Clone, Copy)]
pub struct Progress<'a> {
    pub completed: usize,
    pub total: usize,
    pub outcome: &'a ValidationOutcome,
}

/// One pass over a batch of relays.
///
/// Outcomes are in completion order. `finished_at` is None only while the
/// orchestrator still owns the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRun {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Number of input records.
    pub total: usize,
    pub outcomes: Vec<ValidationOutcome>,
    pub statistics: Statistics,
    pub cancelled: bool,
}

impl ValidationRun {
    pub(crate) fn start(total: usize) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            total,
            outcomes: Vec::with_capacity(total),
            statistics: Statistics::default(),
            cancelled: false,
        }
    }

    /// Append an outcome; returns the new count and the stored outcome.
    pub(crate) fn append(&mut self, outcome: ValidationOutcome) -> (usize, &ValidationOutcome) {
        self.outcomes.push(outcome);
        let completed = self.outcomes.len();
        (completed, &self.outcomes[completed - 1])
    }

    pub(crate) fn finish(mut self, cancelled: bool) -> Self {
        self.cancelled = cancelled;
        self.statistics = stats::aggregate(&self.outcomes);
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn completed(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    pub fn outcome(&self, fingerprint: &str) -> Option<&ValidationOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.fingerprint.eq_ignore_ascii_case(fingerprint))
    }
}
