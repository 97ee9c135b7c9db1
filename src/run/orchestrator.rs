//! Validation run orchestrator.
//!
//! Fans relay checks out to the proof checkers through a bounded pool and
//! collects outcomes on a single path.
//!
//! # Fault isolation
//!
//! - A relay without a claim, or with an unusable one, is classified without
//!   any network call
//! - A panicking check becomes that relay's `NETWORK_ERROR` outcome
//! - Cancellation stops dispatch; in-flight checks are left to finish or time
//!   out on their own, and only outcomes already collected are kept

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::common::dns::HickoryResolver;
use crate::common::fingerprint;
use crate::common::http::ReqwestFetcher;
use crate::config::{ConfigError, ValidatorConfig};
use crate::contact::{parse_contact, ProofDeclaration, ProofMethod, ProofType};
use crate::proof::{
    DnsProofChecker, OutcomeBuilder, ProofChecker, RetryingChecker, UriProofChecker,
    ValidationOutcome, ValidationStatus,
};

use super::types::{Progress, RelayRecord, ValidationRun};
use super::RunError;

/// Orchestrator over the real DNS resolver and HTTPS client.
pub type LiveOrchestrator = ValidationOrchestrator<
    RetryingChecker<DnsProofChecker<HickoryResolver>>,
    RetryingChecker<UriProofChecker<ReqwestFetcher>>,
>;

pub struct ValidationOrchestrator<D, U> {
    dns: Arc<D>,
    uri: Arc<U>,
    concurrency: usize,
    /// Shared by every run on this orchestrator, so checks left running
    /// after a cancel still count against the bound.
    permits: Arc<Semaphore>,
}

impl LiveOrchestrator {
    /// Build the checkers, resolver and HTTP clients described by `config`.
    pub fn from_config(config: &ValidatorConfig) -> Result<Self, RunError> {
        config.validate()?;

        let dns = DnsProofChecker::new(HickoryResolver::new(config.dns_timeout_duration()))
            .timeout(config.dns_timeout_duration());
        let uri = UriProofChecker::new(ReqwestFetcher::new(config.http_timeout_duration())?)
            .timeout(config.http_timeout_duration())
            .max_redirects(config.max_redirects)
            .tls_mode(config.tls_mode)
            .same_host_redirects(config.same_host_redirects);

        Ok(ValidationOrchestrator::new(
            RetryingChecker::new(dns, config.retry_attempts, config.retry_backoff()),
            RetryingChecker::new(uri, config.retry_attempts, config.retry_backoff()),
        )
        .concurrency(config.concurrency))
    }
}

impl<D: ProofChecker, U: ProofChecker> ValidationOrchestrator<D, U> {
    pub fn new(dns: D, uri: U) -> Self {
        Self {
            dns: Arc::new(dns),
            uri: Arc::new(uri),
            concurrency: 10,
            permits: Arc::new(Semaphore::new(10)),
        }
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n;
        self.permits = Arc::new(Semaphore::new(n));
        self
    }

    /// Validate every record, at most `concurrency` checks in flight.
    ///
    /// `on_progress` runs on the collecting path after each append; keep it
    /// cheap. Returns an error only if the run cannot start.
    pub async fn run<P>(
        &self,
        records: Vec<RelayRecord>,
        cancel: &CancellationToken,
        mut on_progress: P,
    ) -> Result<ValidationRun, RunError>
    where
        P: FnMut(Progress<'_>),
    {
        if self.concurrency == 0 {
            return Err(ConfigError::Zero { field: "concurrency" }.into());
        }
        check_records(&records)?;

        let total = records.len();
        info!(total, concurrency = self.concurrency, "starting validation run");

        let mut run = ValidationRun::start(total);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pending = records.into_iter();
        let mut next = pending.next();
        let mut in_flight = 0usize;
        let mut cancelled = false;

        while next.is_some() || in_flight > 0 {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }

                Some(outcome) = rx.recv(), if in_flight > 0 => {
                    in_flight -= 1;
                    deliver(&mut run, outcome, &mut on_progress);
                }

                permit = Arc::clone(&self.permits).acquire_owned(), if next.is_some() => {
                    let Ok(permit) = permit else { break };
                    let Some(record) = next.take() else { continue };
                    next = pending.next();

                    match parse_contact(&record.contact) {
                        ProofDeclaration::Claimed { target, method, version } => {
                            in_flight += 1;
                            self.dispatch(record, target, method, version, permit, tx.clone());
                        }
                        declaration => {
                            drop(permit);
                            deliver(&mut run, classify_locally(&record, &declaration), &mut on_progress);
                        }
                    }
                }
            }
        }

        if cancelled {
            info!(completed = run.completed(), total, abandoned = in_flight, "validation run cancelled");
        } else {
            info!(completed = run.completed(), total, "validation run finished");
        }
        Ok(run.finish(cancelled))
    }

    /// Spawn one network check. The permit is held until the check returns.
    fn dispatch(
        &self,
        record: RelayRecord,
        target: String,
        method: ProofMethod,
        version: Option<String>,
        permit: OwnedSemaphorePermit,
        tx: mpsc::UnboundedSender<ValidationOutcome>,
    ) {
        let dns = Arc::clone(&self.dns);
        let uri = Arc::clone(&self.uri);

        tokio::spawn(async move {
            let _permit = permit;

            let fp = record.fingerprint.clone();
            let check_target = target.clone();
            let check = tokio::spawn(async move {
                match method {
                    ProofMethod::DnsRsa => dns.check(&check_target, &fp).await,
                    ProofMethod::UriRsa => uri.check(&check_target, &fp).await,
                }
            });

            let mut outcome = match check.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(fingerprint = %record.fingerprint, error = %e, "proof check task failed");
                    OutcomeBuilder::new(&record.fingerprint, method.into(), Some(&target))
                        .network_error(format!("Validation task failed: {}", e))
                }
            };

            let mut steps = vec![format!("Parsed contact: proof:{} url:{}", method, target)];
            steps.push(version_step(version.as_deref()));
            steps.append(&mut outcome.steps);
            outcome.steps = steps;
            outcome.nickname = record.nickname;

            // The receiver is gone once the run was cancelled.
            let _ = tx.send(outcome);
        });
    }
}

fn deliver<P>(run: &mut ValidationRun, outcome: ValidationOutcome, on_progress: &mut P)
where
    P: FnMut(Progress<'_>),
{
    debug!(
        fingerprint = %outcome.fingerprint,
        status = %outcome.status,
        elapsed_ms = outcome.elapsed_ms,
        "relay validated"
    );
    let total = run.total;
    let (completed, latest) = run.append(outcome);
    on_progress(Progress { completed, total, outcome: latest });
}

/// Outcome for a relay that needs no network check.
fn classify_locally(record: &RelayRecord, declaration: &ProofDeclaration) -> ValidationOutcome {
    let mut outcome = match declaration {
        ProofDeclaration::Malformed { method, reason, version } => {
            let mut b = OutcomeBuilder::new(&record.fingerprint, (*method).into(), None);
            b.step(format!("Parsed contact: proof:{} without a usable url", method));
            b.step(version_step(version.as_deref()));
            b.finish(ValidationStatus::MalformedDeclaration, reason.clone())
        }
        _ => {
            let detail = if record.contact.trim().is_empty() {
                "No contact information"
            } else {
                "No AROI proof declared in contact"
            };
            OutcomeBuilder::new(&record.fingerprint, ProofType::None, None)
                .finish(ValidationStatus::NoProof, detail)
        }
    };
    outcome.nickname = record.nickname.clone();
    outcome
}

fn version_step(version: Option<&str>) -> String {
    match version {
        Some("2") => "ciissversion: 2".to_string(),
        Some(v) => format!("ciissversion: {} (expected 2; checked anyway)", v),
        None => "ciissversion: not declared".to_string(),
    }
}

/// Reject input that cannot form a run.
fn check_records(records: &[RelayRecord]) -> Result<(), RunError> {
    let mut seen = HashSet::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        if !fingerprint::is_valid(&record.fingerprint) {
            return Err(RunError::InvalidFingerprint {
                index,
                fingerprint: record.fingerprint.clone(),
            });
        }
        if !seen.insert(record.fingerprint.to_ascii_uppercase()) {
            return Err(RunError::DuplicateFingerprint(record.fingerprint.clone()));
        }
    }
    Ok(())
}
