use std::time::Duration;

use tracing::debug;

use crate::common::dns::{DnsError, DnsResolver};
use crate::common::domain::host_from_target;
use crate::common::fingerprint;
use crate::contact::ProofType;

use super::{OutcomeBuilder, ProofChecker, ValidationOutcome, ValidationStatus, PROOF_TOKEN};

/// DNS-RSA proof checker: TXT lookup at `<fingerprint>.<domain>`.
pub struct DnsProofChecker<R: DnsResolver> {
    resolver: R,
    timeout: Duration, // default 5s
}

impl<R: DnsResolver> DnsProofChecker<R> {
    pub fn new(resolver: R) -> Self {
        Self {
            resolver,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Validate a DNS-RSA proof for `fingerprint` under `target`.
    ///
    /// Algorithm:
    /// 1. Reduce target to a domain
    /// 2. Query TXT at `<lowercase fingerprint>.<domain>`
    /// 3. Any record equal to the proof token, or containing the fingerprint, is a match
    /// 4. On a match-bearing answer, record the DNSSEC status as a detail step
    pub async fn check(&self, target: &str, fp: &str) -> ValidationOutcome {
        let mut outcome = OutcomeBuilder::new(fp, ProofType::DnsRsa, Some(target));

        // Step 1: Domain.
        let domain = match host_from_target(target) {
            Some(d) => d,
            None => {
                return outcome.finish(
                    ValidationStatus::MalformedDeclaration,
                    format!("no domain in target '{}'", target),
                )
            }
        };
        let record_name = format!("{}.{}", fp.to_ascii_lowercase(), domain);
        outcome.step(format!("Looking up TXT record at {}", record_name));

        // Step 2: Lookup, bounded by the per-lookup timeout.
        let records = match tokio::time::timeout(self.timeout, self.resolver.query_txt(&record_name)).await {
            Err(_) | Ok(Err(DnsError::Timeout)) => {
                return outcome.timeout(format!(
                    "DNS lookup for {} timed out after {}ms",
                    record_name,
                    self.timeout.as_millis()
                ));
            }
            Ok(Err(e)) if e.is_negative_answer() => {
                return outcome.finish(
                    ValidationStatus::InvalidMismatch,
                    format!("No TXT records found at {} ({}); expected '{}'", record_name, e, PROOF_TOKEN),
                );
            }
            Ok(Err(e)) => {
                return outcome.network_error(format!("DNS lookup for {} failed: {}", record_name, e));
            }
            Ok(Ok(records)) => records,
        };

        if records.is_empty() {
            return outcome.finish(
                ValidationStatus::InvalidMismatch,
                format!("No TXT records found at {}; expected '{}'", record_name, PROOF_TOKEN),
            );
        }
        outcome.step(format!("Found {} TXT record(s)", records.len()));
        debug!(record = %record_name, count = records.len(), "TXT answer");

        // Step 3: Match.
        if !records.iter().any(|r| txt_matches(r, fp)) {
            let found = records
                .iter()
                .map(|r| format!("'{}'", r))
                .collect::<Vec<_>>()
                .join(", ");
            return outcome.finish(
                ValidationStatus::InvalidMismatch,
                format!(
                    "TXT record mismatch at {}: found {}; expected '{}'",
                    record_name, found, PROOF_TOKEN
                ),
            );
        }

        // Step 4: DNSSEC, informational only.
        let dnssec = tokio::time::timeout(self.timeout, self.resolver.query_txt_dnssec(&record_name))
            .await
            .ok()
            .flatten();
        outcome.step(match dnssec {
            Some(true) => "DNSSEC: answer validated",
            Some(false) => "DNSSEC: answer not validated",
            None => "DNSSEC: status unavailable",
        });

        outcome.finish(
            ValidationStatus::Valid,
            format!("Found valid proof at {}", record_name),
        )
    }
}

impl<R: DnsResolver> ProofChecker for DnsProofChecker<R> {
    async fn check(&self, target: &str, fingerprint: &str) -> ValidationOutcome {
        DnsProofChecker::check(self, target, fingerprint).await
    }
}

/// True if a TXT value proves ownership for `fp`.
fn txt_matches(value: &str, fp: &str) -> bool {
    let v = value.trim().trim_matches('"').trim();
    v.eq_ignore_ascii_case(PROOF_TOKEN) || fingerprint::appears_in(v, fp)
}
