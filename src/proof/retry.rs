use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::{ProofChecker, ValidationOutcome};

/// Retries a checker on `NETWORK_ERROR`/`TIMEOUT` with exponential backoff.
///
/// The final attempt's outcome is returned; earlier failures are summarized
/// at the front of its detail steps and `elapsed_ms` covers all attempts.
pub struct RetryingChecker<C> {
    inner: C,
    max_attempts: u32,
    backoff: Duration,
}

impl<C: ProofChecker> RetryingChecker<C> {
    pub fn new(inner: C, max_attempts: u32, backoff: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: ProofChecker> ProofChecker for RetryingChecker<C> {
    async fn check(&self, target: &str, fingerprint: &str) -> ValidationOutcome {
        let started = Instant::now();
        let mut earlier = Vec::new();
        let mut delay = self.backoff;
        let mut attempt = 1;

        loop {
            let mut outcome = self.inner.check(target, fingerprint).await;
            if !outcome.status.is_error() || attempt >= self.max_attempts {
                if !earlier.is_empty() {
                    earlier.append(&mut outcome.steps);
                    outcome.steps = earlier;
                }
                outcome.elapsed_ms = started.elapsed().as_millis() as u64;
                return outcome;
            }

            let reason = outcome.error_message.unwrap_or_else(|| outcome.status.to_string());
            debug!(%fingerprint, attempt, %reason, "retrying proof check");
            earlier.push(format!(
                "Attempt {}/{} failed ({}): {}; retrying in {}ms",
                attempt,
                self.max_attempts,
                outcome.status,
                reason,
                delay.as_millis()
            ));

            tokio::time::sleep(delay).await;
            delay = delay.saturating_mul(2);
            attempt += 1;
        }
    }
}
