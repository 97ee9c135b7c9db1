//! Relay directory: where the batch of relays comes from.
//!
//! The validator only needs fingerprint, nickname and contact per relay.
//! [`OnionooDirectory`] reads them from the public Onionoo `details`
//! endpoint; parsing is kept separate from the transport so it can be tested
//! against captured documents.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::common::http::USER_AGENT;
use crate::run::RelayRecord;

pub const ONIONOO_DETAILS_URL: &str =
    "https://onionoo.torproject.org/details?type=relay&fields=fingerprint,nickname,contact,running";

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("directory request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("directory returned HTTP {0}")]
    Status(u16),
    #[error("directory document is invalid: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Source of relay records for a run.
pub trait RelayDirectory: Send + Sync {
    fn fetch_relays(&self) -> impl Future<Output = Result<Vec<RelayRecord>, DirectoryError>> + Send;
}

#[derive(Deserialize)]
struct DetailsDocument {
    #[serde(default)]
    relays: Vec<DetailsRelay>,
}

#[derive(Deserialize)]
struct DetailsRelay {
    fingerprint: String,
    #[serde(default)]
    nickname: Option<String>,
    #[serde(default)]
    contact: Option<String>,
    #[serde(default)]
    running: Option<bool>,
}

/// Turn an Onionoo `details` document into relay records, keeping at most
/// `limit` of them in document order.
pub fn parse_details(json: &str, limit: Option<usize>) -> Result<Vec<RelayRecord>, DirectoryError> {
    let doc: DetailsDocument = serde_json::from_str(json)?;
    let take = limit.unwrap_or(usize::MAX);
    Ok(doc
        .relays
        .into_iter()
        .take(take)
        .map(|r| RelayRecord {
            fingerprint: r.fingerprint,
            nickname: r.nickname.unwrap_or_default(),
            contact: r.contact.unwrap_or_default(),
            reachable: r.running.unwrap_or(false),
        })
        .collect())
}

/// Onionoo over HTTPS.
#[derive(Clone)]
pub struct OnionooDirectory {
    client: Client,
    url: String,
    limit: Option<usize>,
}

impl OnionooDirectory {
    pub fn new(timeout: Duration) -> Result<Self, DirectoryError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            url: ONIONOO_DETAILS_URL.to_string(),
            limit: None,
        })
    }

    /// Query a different Onionoo-compatible endpoint.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl RelayDirectory for OnionooDirectory {
    async fn fetch_relays(&self) -> Result<Vec<RelayRecord>, DirectoryError> {
        debug!(url = %self.url, "fetching relay directory");
        let resp = self.client.get(&self.url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DirectoryError::Status(status.as_u16()));
        }
        let body = resp.text().await?;
        let relays = parse_details(&body, self.limit)?;
        info!(count = relays.len(), "fetched relay directory");
        Ok(relays)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "version": "8.0",
        "relays_published": "2024-05-01 12:00:00",
        "relays": [
            {
                "nickname": "alpha",
                "fingerprint": "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
                "contact": "email:ops[]example.com url:example.com proof:dns-rsa ciissversion:2",
                "running": true
            },
            {
                "nickname": "bravo",
                "fingerprint": "BBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB",
                "running": false
            },
            {
                "fingerprint": "CCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCC",
                "contact": null
            }
        ],
        "bridges": []
    }"#;

    #[test]
    fn parses_relays() {
        let relays = parse_details(DOC, None).unwrap();
        assert_eq!(relays.len(), 3);
        assert_eq!(relays[0].nickname, "alpha");
        assert!(relays[0].contact.contains("proof:dns-rsa"));
        assert!(relays[0].reachable);
        assert_eq!(relays[1].contact, "");
        assert!(!relays[1].reachable);
        assert_eq!(relays[2].nickname, "");
        assert_eq!(relays[2].contact, "");
    }

    #[test]
    fn limit_keeps_document_order() {
        let relays = parse_details(DOC, Some(2)).unwrap();
        let fps: Vec<_> = relays.iter().map(|r| &r.fingerprint[..1]).collect();
        assert_eq!(fps, ["A", "B"]);
        assert!(parse_details(DOC, Some(0)).unwrap().is_empty());
    }

    #[test]
    fn missing_relays_array_is_empty() {
        assert!(parse_details(r#"{"version":"8.0"}"#, None).unwrap().is_empty());
    }

    #[test]
    fn invalid_document() {
        assert!(matches!(parse_details("<html>", None), Err(DirectoryError::Parse(_))));
        assert!(matches!(
            parse_details(r#"{"relays":[{"nickname":"x"}]}"#, None),
            Err(DirectoryError::Parse(_))
        ));
    }

    #[test]
    fn builder_overrides() {
        let dir = OnionooDirectory::new(Duration::from_secs(5))
            .unwrap()
            .url("http://127.0.0.1:1/details")
            .limit(10);
        assert_eq!(dir.url, "http://127.0.0.1:1/details");
        assert_eq!(dir.limit, Some(10));
    }
}
