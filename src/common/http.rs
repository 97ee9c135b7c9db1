use std::collections::HashMap;
use std::error::Error as _;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use reqwest::redirect::Policy;
use reqwest::{header, tls, Client};
use thiserror::Error;

pub(crate) const USER_AGENT: &str = concat!("aroi-validator/", env!("CARGO_PKG_VERSION"));

/// Proof documents are tiny; anything past this is not read.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("timeout")]
    Timeout,
    #[error("TLS negotiation failed: {0}")]
    Tls(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("HTTP error: {0}")]
    Other(String),
}

/// A single HTTP response. Redirects are never followed by the fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub location: Option<String>,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self { status: 200, location: None, body: body.into() }
    }

    pub fn status(status: u16) -> Self {
        Self { status, location: None, body: String::new() }
    }

    pub fn redirect(status: u16, location: impl Into<String>) -> Self {
        Self { status, location: Some(location.into()), body: String::new() }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }
}

/// HTTP GET abstraction used by the URI proof checker.
pub trait HttpFetcher: Clone + Send + Sync + 'static {
    /// GET `url`. With `relaxed_tls`, certificate and hostname verification
    /// are off.
    fn get(&self, url: &str, relaxed_tls: bool) -> impl Future<Output = Result<HttpResponse, FetchError>> + Send;
}

/// reqwest-backed fetcher with a strict and a legacy-compatible client.
#[derive(Clone)]
pub struct ReqwestFetcher {
    strict: Client,
    relaxed: Client,
}

impl ReqwestFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let strict = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .redirect(Policy::none())
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Other(e.to_string()))?;

        let relaxed = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .redirect(Policy::none())
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            // Only a floor; the system TLS library may still refuse 1.0/1.1.
            .min_tls_version(tls::Version::TLS_1_0)
            .build()
            .map_err(|e| FetchError::Other(e.to_string()))?;

        Ok(Self { strict, relaxed })
    }

    fn classify_error(e: &reqwest::Error) -> FetchError {
        let host = e.url().and_then(|u| u.host_str());
        classify_failure(e.is_timeout(), e.is_connect(), &cause_chain(e), host, error_chain(e))
    }
}

/// Decide a failure class from reqwest's flags and the error's causes.
///
/// Only the causes are searched for TLS markers. reqwest's own message
/// carries the request URL, and a host such as `ssl.example.net` must not
/// read as a handshake failure; any mention of `host` is dropped as well.
fn classify_failure(timeout: bool, connect: bool, causes: &str, host: Option<&str>, message: String) -> FetchError {
    if timeout {
        return FetchError::Timeout;
    }
    let mut lower = causes.to_lowercase();
    if let Some(host) = host.filter(|h| !h.is_empty()) {
        lower = lower.replace(&host.to_lowercase(), "");
    }
    let tls = ["tls", "ssl", "certificate", "handshake"]
        .iter()
        .any(|marker| lower.contains(marker));
    if tls {
        FetchError::Tls(message)
    } else if connect {
        FetchError::Connect(message)
    } else {
        FetchError::Other(message)
    }
}

/// reqwest's Display hides the cause; walk the source chain.
fn error_chain(e: &reqwest::Error) -> String {
    let mut msg = e.to_string();
    let causes = cause_chain(e);
    if !causes.is_empty() {
        msg.push_str(": ");
        msg.push_str(&causes);
    }
    msg
}

fn cause_chain(e: &reqwest::Error) -> String {
    let mut parts = Vec::new();
    let mut source = e.source();
    while let Some(s) = source {
        parts.push(s.to_string());
        source = s.source();
    }
    parts.join(": ")
}

impl HttpFetcher for ReqwestFetcher {
    async fn get(&self, url: &str, relaxed_tls: bool) -> Result<HttpResponse, FetchError> {
        let client = if relaxed_tls { &self.relaxed } else { &self.strict };
        let mut resp = client
            .get(url)
            .header(header::ACCEPT, "text/plain, */*")
            .send()
            .await
            .map_err(|e| Self::classify_error(&e))?;

        let status = resp.status().as_u16();
        let location = resp
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut body = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(|e| Self::classify_error(&e))? {
            let room = MAX_BODY_BYTES - body.len();
            body.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if body.len() >= MAX_BODY_BYTES {
                break;
            }
        }

        Ok(HttpResponse {
            status,
            location,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

#[derive(Debug, Clone)]
enum MockRoute {
    Respond(HttpResponse),
    Fail(FetchError),
    /// Strict TLS fails; the relaxed client gets the response.
    LegacyTlsOnly(HttpResponse),
}

/// Mock fetcher for testing
#[derive(Clone, Default)]
pub struct MockFetcher {
    routes: Arc<Mutex<HashMap<String, MockRoute>>>,
    requests: Arc<Mutex<Vec<(String, bool)>>>,
    delay: Arc<Mutex<Option<Duration>>>,
}

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_response(&self, url: &str, response: HttpResponse) {
        locked(&self.routes).insert(url.to_string(), MockRoute::Respond(response));
    }

    pub fn add_error(&self, url: &str, error: FetchError) {
        locked(&self.routes).insert(url.to_string(), MockRoute::Fail(error));
    }

    pub fn add_legacy_tls_only(&self, url: &str, response: HttpResponse) {
        locked(&self.routes).insert(url.to_string(), MockRoute::LegacyTlsOnly(response));
    }

    pub fn set_delay(&self, delay: Duration) {
        *locked(&self.delay) = Some(delay);
    }

    /// Every `(url, relaxed_tls)` pair requested so far, in order.
    pub fn requests(&self) -> Vec<(String, bool)> {
        locked(&self.requests).clone()
    }
}

impl HttpFetcher for MockFetcher {
    async fn get(&self, url: &str, relaxed_tls: bool) -> Result<HttpResponse, FetchError> {
        locked(&self.requests).push((url.to_string(), relaxed_tls));
        let delay = *locked(&self.delay);
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        let route = locked(&self.routes).get(url).cloned();
        match route {
            Some(MockRoute::Respond(resp)) => Ok(resp),
            Some(MockRoute::Fail(err)) => Err(err),
            Some(MockRoute::LegacyTlsOnly(resp)) if relaxed_tls => Ok(resp),
            Some(MockRoute::LegacyTlsOnly(_)) => {
                Err(FetchError::Tls("unsupported protocol version".into()))
            }
            None => Err(FetchError::Connect(format!("no route to {}", url))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_fetcher_response() {
        let fetcher = MockFetcher::new();
        fetcher.add_response("https://example.com/a", HttpResponse::ok("hello"));

        let resp = fetcher.get("https://example.com/a", false).await.unwrap();
        assert!(resp.is_success());
        assert_eq!(resp.body, "hello");
        assert_eq!(fetcher.requests(), vec![("https://example.com/a".to_string(), false)]);
    }

    #[tokio::test]
    async fn test_mock_fetcher_unknown_route_is_connect_error() {
        let fetcher = MockFetcher::new();
        let err = fetcher.get("https://nowhere.example/", false).await.unwrap_err();
        assert!(matches!(err, FetchError::Connect(_)));
    }

    #[tokio::test]
    async fn test_mock_fetcher_legacy_tls_only() {
        let fetcher = MockFetcher::new();
        fetcher.add_legacy_tls_only("https://old.example/", HttpResponse::ok("x"));

        assert!(matches!(
            fetcher.get("https://old.example/", false).await,
            Err(FetchError::Tls(_))
        ));
        assert!(fetcher.get("https://old.example/", true).await.is_ok());
    }

    #[test]
    fn response_classes() {
        assert!(HttpResponse::status(204).is_success());
        assert!(!HttpResponse::status(404).is_success());
        assert!(HttpResponse::redirect(301, "/x").is_redirect());
        assert!(!HttpResponse::ok("").is_redirect());
    }

    // --- Failure classification ---

    #[test]
    fn refused_connection_to_tls_named_host_is_connect() {
        let err = classify_failure(
            false,
            true,
            "client error (Connect): tcp connect error: Connection refused (os error 111)",
            Some("ssl.example.net"),
            "error sending request for url (https://ssl.example.net/.well-known/tor-relay/rsa-fingerprint.txt)".into(),
        );
        assert!(matches!(err, FetchError::Connect(_)));

        let err = classify_failure(
            false,
            true,
            "dns error: failed to lookup address information for tlsrelays.org",
            Some("tlsrelays.org"),
            "error sending request".into(),
        );
        assert!(matches!(err, FetchError::Connect(_)));
    }

    #[test]
    fn handshake_failure_is_tls() {
        let err = classify_failure(
            false,
            true,
            "client error (Connect): error:0A000102:SSL routines:ssl_choose_client_version:unsupported protocol",
            Some("relay.example.org"),
            "error sending request".into(),
        );
        assert!(matches!(err, FetchError::Tls(_)));

        let err = classify_failure(
            false,
            true,
            "The certificate was not trusted.",
            None,
            "error sending request".into(),
        );
        assert!(matches!(err, FetchError::Tls(_)));
    }

    #[test]
    fn timeout_wins_over_causes() {
        let err = classify_failure(true, true, "tls handshake eof", None, "timed out".into());
        assert_eq!(err, FetchError::Timeout);
    }

    #[test]
    fn other_failures_keep_message() {
        let err = classify_failure(false, false, "connection reset by peer", Some("example.com"), "body error".into());
        assert_eq!(err, FetchError::Other("body error".into()));
    }

    #[test]
    fn reqwest_fetcher_builds() {
        assert!(ReqwestFetcher::new(Duration::from_secs(5)).is_ok());
    }
}
