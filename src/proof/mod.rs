pub mod dns;
pub mod retry;
pub mod uri;

pub use dns::DnsProofChecker;
pub use retry::RetryingChecker;
pub use uri::UriProofChecker;

use std::fmt;
use std::future::Future;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::contact::ProofType;

/// Value the ContactInfo v2 scheme expects in proof artifacts.
pub const PROOF_TOKEN: &str = "we-run-this-tor-relay";

// ---------------------------------------------------------------------------
// ValidationStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    Valid,
    /// The proof artifact was reachable but did not match.
    InvalidMismatch,
    /// The relay made no claim.
    NoProof,
    /// A claim was made but could not be checked.
    MalformedDeclaration,
    NetworkError,
    Timeout,
}

impl ValidationStatus {
    /// Transport-level failures; these carry an error message.
    pub fn is_error(&self) -> bool {
        matches!(self, ValidationStatus::NetworkError | ValidationStatus::Timeout)
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValidationStatus::Valid => "VALID",
            ValidationStatus::InvalidMismatch => "INVALID_MISMATCH",
            ValidationStatus::NoProof => "NO_PROOF",
            ValidationStatus::MalformedDeclaration => "MALFORMED_DECLARATION",
            ValidationStatus::NetworkError => "NETWORK_ERROR",
            ValidationStatus::Timeout => "TIMEOUT",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ValidationOutcome
// ---------------------------------------------------------------------------

/// Result of validating one relay. Build through [`OutcomeBuilder`], which
/// keeps `error_message` present exactly for error statuses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub fingerprint: String,
    #[serde(default)]
    pub nickname: String,
    pub proof_type: ProofType,
    pub target: Option<String>,
    pub status: ValidationStatus,
    /// Human-readable log of every check performed, in order.
    pub steps: Vec<String>,
    pub error_message: Option<String>,
    pub elapsed_ms: u64,
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        self.status == ValidationStatus::Valid
    }
}

/// Accumulates detail steps and timing for one check.
#[derive(Debug)]
pub struct OutcomeBuilder {
    fingerprint: String,
    proof_type: ProofType,
    target: Option<String>,
    steps: Vec<String>,
    started: Instant,
}

impl OutcomeBuilder {
    pub fn new(fingerprint: &str, proof_type: ProofType, target: Option<&str>) -> Self {
        Self {
            fingerprint: fingerprint.to_string(),
            proof_type,
            target: target.map(str::to_string),
            steps: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn step(&mut self, step: impl Into<String>) {
        self.steps.push(step.into());
    }

    /// Conclude with `status`; `detail` becomes the final step (and the
    /// error message, for error statuses).
    pub fn finish(self, status: ValidationStatus, detail: impl Into<String>) -> ValidationOutcome {
        self.build(status, detail.into())
    }

    /// Conclude with `NETWORK_ERROR`.
    pub fn network_error(self, message: impl Into<String>) -> ValidationOutcome {
        self.build(ValidationStatus::NetworkError, message.into())
    }

    /// Conclude with `TIMEOUT`.
    pub fn timeout(self, message: impl Into<String>) -> ValidationOutcome {
        self.build(ValidationStatus::Timeout, message.into())
    }

    fn build(mut self, status: ValidationStatus, message: String) -> ValidationOutcome {
        let error_message = if status.is_error() {
            let msg = if message.is_empty() { status.to_string() } else { message.clone() };
            Some(msg)
        } else {
            None
        };
        if !message.is_empty() {
            self.steps.push(message);
        }
        ValidationOutcome {
            fingerprint: self.fingerprint,
            nickname: String::new(),
            proof_type: self.proof_type,
            target: self.target,
            status,
            steps: self.steps,
            error_message,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}

// ---------------------------------------------------------------------------
// ProofChecker
// ---------------------------------------------------------------------------

/// One proof mechanism. Implementations never fail: every problem is
/// reported through the returned outcome's status.
pub trait ProofChecker: Send + Sync + 'static {
    fn check(&self, target: &str, fingerprint: &str) -> impl Future<Output = ValidationOutcome> + Send;
}
