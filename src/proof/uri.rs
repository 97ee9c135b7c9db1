use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, warn};
use url::Url;

use crate::common::domain::{normalize, split_scheme, within_domain};
use crate::common::fingerprint;
use crate::common::http::{FetchError, HttpFetcher, HttpResponse};
use crate::config::TlsMode;
use crate::contact::ProofType;

use super::{OutcomeBuilder, ProofChecker, ValidationOutcome, ValidationStatus};

/// Path of the proof document on a bare domain.
pub const WELL_KNOWN_PATH: &str = "/.well-known/tor-relay/rsa-fingerprint.txt";

/// Resolve a declared target into the proof document URL.
///
/// A bare domain or a URL without a path gets the well-known path; a URL
/// with a path is used as-is.
pub fn proof_url(target: &str) -> Result<Url, String> {
    let (scheme, _) = split_scheme(target);
    let with_scheme = match scheme {
        Some(_) => target.to_string(),
        None => format!("https://{}", target),
    };
    let mut url = Url::parse(&with_scheme).map_err(|e| format!("invalid url '{}': {}", target, e))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported url scheme '{}' in '{}'", url.scheme(), target));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(format!("no host in url '{}'", target));
    }
    if url.path().is_empty() || url.path() == "/" {
        url.set_path(WELL_KNOWN_PATH);
    }
    Ok(url)
}

/// Why a fetch produced no usable response.
enum FetchFailure {
    Timeout(String),
    Network(String),
}

/// URI-RSA proof checker: fetch a document and look for the fingerprint.
pub struct UriProofChecker<F: HttpFetcher> {
    fetcher: F,
    timeout: Duration,       // default 10s
    max_redirects: usize,    // default 3
    tls_mode: TlsMode,
    same_host_redirects: bool,
}

impl<F: HttpFetcher> UriProofChecker<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            timeout: Duration::from_secs(10),
            max_redirects: 3,
            tls_mode: TlsMode::LegacyCompatible,
            same_host_redirects: true,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_redirects(mut self, n: usize) -> Self {
        self.max_redirects = n;
        self
    }

    pub fn tls_mode(mut self, mode: TlsMode) -> Self {
        self.tls_mode = mode;
        self
    }

    pub fn same_host_redirects(mut self, enabled: bool) -> Self {
        self.same_host_redirects = enabled;
        self
    }

    /// Validate a URI-RSA proof for `fp` under `target`.
    pub async fn check(&self, target: &str, fp: &str) -> ValidationOutcome {
        let mut outcome = OutcomeBuilder::new(fp, ProofType::UriRsa, Some(target));

        let url = match proof_url(target) {
            Ok(u) => u,
            Err(reason) => return outcome.finish(ValidationStatus::MalformedDeclaration, reason),
        };
        let origin = url.host_str().map(normalize).unwrap_or_default();
        outcome.step(format!("Fetching {}", url));

        let mut relaxed = false;
        let mut visited = HashSet::from([url.to_string()]);
        let mut current = url;
        let mut redirects = 0;

        let response = loop {
            let resp = match self.fetch(&current, &mut relaxed, &mut outcome).await {
                Ok(r) => r,
                Err(FetchFailure::Timeout(msg)) => return outcome.timeout(msg),
                Err(FetchFailure::Network(msg)) => return outcome.network_error(msg),
            };

            if !resp.is_redirect() {
                break resp;
            }

            // Redirect handling
            let Some(location) = resp.location.as_deref() else {
                return outcome.network_error(format!(
                    "HTTP {} from '{}' without a Location header",
                    resp.status, current
                ));
            };
            if redirects >= self.max_redirects {
                return outcome.network_error(format!(
                    "Exceeded {} redirect(s) while fetching '{}'",
                    self.max_redirects, current
                ));
            }
            let next = match current.join(location) {
                Ok(u) if matches!(u.scheme(), "http" | "https") => u,
                _ => {
                    return outcome.network_error(format!("Invalid redirect target '{}'", location));
                }
            };
            if self.same_host_redirects {
                let host = next.host_str().unwrap_or("");
                if !within_domain(host, &origin) {
                    return outcome.network_error(format!(
                        "Redirect to disallowed host '{}' (outside {})",
                        next, origin
                    ));
                }
            }
            if !visited.insert(next.to_string()) {
                return outcome.network_error(format!("Redirect loop at '{}'", next));
            }
            outcome.step(format!("HTTP {} redirect to {}", resp.status, next));
            redirects += 1;
            current = next;
        };

        if !response.is_success() {
            return outcome.network_error(format!(
                "HTTP returned status {} from '{}'",
                response.status, current
            ));
        }
        outcome.step(format!(
            "HTTP {} from {} ({} bytes)",
            response.status,
            current,
            response.body.len()
        ));

        let tls_note = if relaxed { " (fetched with legacy-compatible TLS)" } else { "" };
        if fingerprint::appears_in(&response.body, fp) {
            outcome.finish(
                ValidationStatus::Valid,
                format!("Found fingerprint in document at {}{}", current, tls_note),
            )
        } else {
            outcome.finish(
                ValidationStatus::InvalidMismatch,
                format!(
                    "Fingerprint '{}' not found in document at {}{}",
                    fp.to_ascii_uppercase(),
                    current,
                    tls_note
                ),
            )
        }
    }

    /// One GET, with the legacy TLS fallback when enabled.
    async fn fetch(
        &self,
        url: &Url,
        relaxed: &mut bool,
        outcome: &mut OutcomeBuilder,
    ) -> Result<HttpResponse, FetchFailure> {
        let result = match self.get_once(url, *relaxed).await {
            Err(FetchError::Tls(e)) if !*relaxed && self.tls_mode == TlsMode::LegacyCompatible => {
                warn!(url = %url, error = %e, "strict TLS failed, retrying with legacy-compatible TLS");
                outcome.step(format!("TLS negotiation failed with strict settings: {}", e));
                outcome.step(
                    "Retrying with legacy-compatible TLS: certificate and hostname verification disabled",
                );
                *relaxed = true;
                self.get_once(url, true).await
            }
            other => other,
        };

        result.map_err(|e| match e {
            FetchError::Timeout => FetchFailure::Timeout(format!(
                "Fetching '{}' timed out after {}ms",
                url,
                self.timeout.as_millis()
            )),
            FetchError::Tls(msg) if self.tls_mode == TlsMode::Strict => FetchFailure::Network(format!(
                "TLS negotiation failed for '{}' (strict TLS mode): {}",
                url, msg
            )),
            other => FetchFailure::Network(format!("Failed to fetch '{}': {}", url, other)),
        })
    }

    async fn get_once(&self, url: &Url, relaxed: bool) -> Result<HttpResponse, FetchError> {
        debug!(url = %url, relaxed, "GET");
        match tokio::time::timeout(self.timeout, self.fetcher.get(url.as_str(), relaxed)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout),
        }
    }
}

impl<F: HttpFetcher> ProofChecker for UriProofChecker<F> {
    async fn check(&self, target: &str, fingerprint: &str) -> ValidationOutcome {
        UriProofChecker::check(self, target, fingerprint).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::http::MockFetcher;

    const FP: &str = "ABCDEF0123456789ABCDEF0123456789ABCDEF01";
    const PROOF_URL: &str = "https://example.com/.well-known/tor-relay/rsa-fingerprint.txt";

    fn checker(fetcher: &MockFetcher) -> UriProofChecker<MockFetcher> {
        UriProofChecker::new(fetcher.clone()).timeout(Duration::from_secs(2))
    }

    fn proof_body() -> String {
        format!("# relays run by example.com\n{}\n", FP.to_ascii_lowercase())
    }

    // --- proof_url tests ---

    #[test]
    fn proof_url_from_bare_domain() {
        assert_eq!(proof_url("example.com").unwrap().as_str(), PROOF_URL);
    }

    #[test]
    fn proof_url_from_scheme_and_host() {
        assert_eq!(proof_url("https://example.com/").unwrap().as_str(), PROOF_URL);
        assert_eq!(proof_url("https://example.com").unwrap().as_str(), PROOF_URL);
    }

    #[test]
    fn proof_url_with_path_used_as_is() {
        assert_eq!(
            proof_url("https://example.com/tor/fps.txt").unwrap().as_str(),
            "https://example.com/tor/fps.txt"
        );
    }

    #[test]
    fn proof_url_rejects_other_schemes() {
        assert!(proof_url("ftp://example.com").is_err());
    }

    // --- Verdicts ---

    #[tokio::test]
    async fn document_with_fingerprint_is_valid() {
        let fetcher = MockFetcher::new();
        fetcher.add_response(PROOF_URL, HttpResponse::ok(proof_body()));

        let outcome = checker(&fetcher).check("example.com", FP).await;
        assert_eq!(outcome.status, ValidationStatus::Valid);
        assert_eq!(outcome.error_message, None);
        assert_eq!(fetcher.requests(), vec![(PROOF_URL.to_string(), false)]);
    }

    #[tokio::test]
    async fn document_without_fingerprint_is_mismatch() {
        let fetcher = MockFetcher::new();
        fetcher.add_response(PROOF_URL, HttpResponse::ok("0000000000000000000000000000000000000000\n"));

        let outcome = checker(&fetcher).check("example.com", FP).await;
        assert_eq!(outcome.status, ValidationStatus::InvalidMismatch);
        assert_eq!(outcome.error_message, None);
    }

    #[tokio::test]
    async fn not_found_is_network_error() {
        let fetcher = MockFetcher::new();
        fetcher.add_response(PROOF_URL, HttpResponse::status(404));

        let outcome = checker(&fetcher).check("example.com", FP).await;
        assert_eq!(outcome.status, ValidationStatus::NetworkError);
        assert!(outcome.error_message.unwrap().contains("404"));
    }

    #[tokio::test]
    async fn connection_failure_is_network_error() {
        let fetcher = MockFetcher::new();
        fetcher.add_error(PROOF_URL, FetchError::Connect("connection refused".into()));

        let outcome = checker(&fetcher).check("example.com", FP).await;
        assert_eq!(outcome.status, ValidationStatus::NetworkError);
    }

    #[tokio::test]
    async fn connection_failure_does_not_relax_tls() {
        let url = "https://ssl.example.net/.well-known/tor-relay/rsa-fingerprint.txt";
        let fetcher = MockFetcher::new();
        fetcher.add_error(url, FetchError::Connect("tcp connect error: Connection refused".into()));

        let outcome = checker(&fetcher).check("ssl.example.net", FP).await;
        assert_eq!(outcome.status, ValidationStatus::NetworkError);
        assert_eq!(fetcher.requests(), vec![(url.to_string(), false)]);
        assert!(!outcome.steps.iter().any(|s| s.contains("TLS")));
        assert!(!outcome.error_message.unwrap().contains("TLS"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_server_times_out() {
        let fetcher = MockFetcher::new();
        fetcher.add_response(PROOF_URL, HttpResponse::ok(proof_body()));
        fetcher.set_delay(Duration::from_secs(60));

        let outcome = checker(&fetcher).check("example.com", FP).await;
        assert_eq!(outcome.status, ValidationStatus::Timeout);
        assert!(outcome.error_message.is_some());
    }

    #[tokio::test]
    async fn unsupported_scheme_is_malformed() {
        let fetcher = MockFetcher::new();
        let outcome = checker(&fetcher).check("ftp://example.com", FP).await;
        assert_eq!(outcome.status, ValidationStatus::MalformedDeclaration);
        assert!(fetcher.requests().is_empty());
    }

    // --- Redirects ---

    #[tokio::test]
    async fn relative_redirect_followed() {
        let fetcher = MockFetcher::new();
        fetcher.add_response(PROOF_URL, HttpResponse::redirect(301, "/tor/fps.txt"));
        fetcher.add_response("https://example.com/tor/fps.txt", HttpResponse::ok(proof_body()));

        let outcome = checker(&fetcher).check("example.com", FP).await;
        assert_eq!(outcome.status, ValidationStatus::Valid);
        assert!(outcome.steps.iter().any(|s| s.starts_with("HTTP 301 redirect")));
    }

    #[tokio::test]
    async fn redirect_to_subdomain_allowed() {
        let fetcher = MockFetcher::new();
        fetcher.add_response(
            PROOF_URL,
            HttpResponse::redirect(302, "https://www.example.com/.well-known/tor-relay/rsa-fingerprint.txt"),
        );
        fetcher.add_response(
            "https://www.example.com/.well-known/tor-relay/rsa-fingerprint.txt",
            HttpResponse::ok(proof_body()),
        );

        let outcome = checker(&fetcher).check("example.com", FP).await;
        assert_eq!(outcome.status, ValidationStatus::Valid);
    }

    #[tokio::test]
    async fn redirect_off_domain_refused() {
        let fetcher = MockFetcher::new();
        fetcher.add_response(PROOF_URL, HttpResponse::redirect(302, "https://evil.example/proof.txt"));

        let outcome = checker(&fetcher).check("example.com", FP).await;
        assert_eq!(outcome.status, ValidationStatus::NetworkError);
        assert!(outcome.error_message.unwrap().contains("disallowed host"));
    }

    #[tokio::test]
    async fn redirect_off_domain_allowed_when_disabled() {
        let fetcher = MockFetcher::new();
        fetcher.add_response(PROOF_URL, HttpResponse::redirect(302, "https://cdn.example/proof.txt"));
        fetcher.add_response("https://cdn.example/proof.txt", HttpResponse::ok(proof_body()));

        let outcome = checker(&fetcher)
            .same_host_redirects(false)
            .check("example.com", FP)
            .await;
        assert_eq!(outcome.status, ValidationStatus::Valid);
    }

    #[tokio::test]
    async fn redirect_loop_is_network_error() {
        let fetcher = MockFetcher::new();
        fetcher.add_response(PROOF_URL, HttpResponse::redirect(302, "/b"));
        fetcher.add_response("https://example.com/b", HttpResponse::redirect(302, PROOF_URL));

        let outcome = checker(&fetcher).check("example.com", FP).await;
        assert_eq!(outcome.status, ValidationStatus::NetworkError);
        assert!(outcome.error_message.unwrap().contains("loop"));
    }

    #[tokio::test]
    async fn redirect_limit_exceeded() {
        let fetcher = MockFetcher::new();
        fetcher.add_response(PROOF_URL, HttpResponse::redirect(302, "/1"));
        fetcher.add_response("https://example.com/1", HttpResponse::redirect(302, "/2"));
        fetcher.add_response("https://example.com/2", HttpResponse::redirect(302, "/3"));
        fetcher.add_response("https://example.com/3", HttpResponse::ok(proof_body()));

        let outcome = checker(&fetcher).max_redirects(2).check("example.com", FP).await;
        assert_eq!(outcome.status, ValidationStatus::NetworkError);
        assert!(outcome.error_message.unwrap().contains("Exceeded 2 redirect"));
    }

    // --- TLS modes ---

    #[tokio::test]
    async fn legacy_tls_fallback_is_recorded() {
        let fetcher = MockFetcher::new();
        fetcher.add_legacy_tls_only(PROOF_URL, HttpResponse::ok(proof_body()));

        let outcome = checker(&fetcher).check("example.com", FP).await;
        assert_eq!(outcome.status, ValidationStatus::Valid);
        assert!(outcome
            .steps
            .iter()
            .any(|s| s == "Retrying with legacy-compatible TLS: certificate and hostname verification disabled"));
        assert!(outcome.steps.last().unwrap().contains("legacy-compatible TLS"));
        assert_eq!(
            fetcher.requests(),
            vec![(PROOF_URL.to_string(), false), (PROOF_URL.to_string(), true)]
        );
    }

    #[tokio::test]
    async fn strict_tls_mode_does_not_relax() {
        let fetcher = MockFetcher::new();
        fetcher.add_legacy_tls_only(PROOF_URL, HttpResponse::ok(proof_body()));

        let outcome = checker(&fetcher)
            .tls_mode(TlsMode::Strict)
            .check("example.com", FP)
            .await;
        assert_eq!(outcome.status, ValidationStatus::NetworkError);
        assert!(outcome.error_message.unwrap().contains("strict TLS mode"));
        assert_eq!(fetcher.requests().len(), 1);
    }
}
