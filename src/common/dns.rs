use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::{ResolveError, TokioResolver};
use thiserror::Error;

use super::domain::normalize;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnsError {
    #[error("NXDOMAIN: domain does not exist")]
    NxDomain,
    #[error("no TXT records")]
    NoRecords,
    #[error("SERVFAIL: server failure")]
    ServFail,
    #[error("timeout")]
    Timeout,
    #[error("DNS error: {0}")]
    Other(String),
}

impl DnsError {
    /// A definitive negative answer, as opposed to a resolver-level failure.
    pub fn is_negative_answer(&self) -> bool {
        matches!(self, DnsError::NxDomain | DnsError::NoRecords)
    }
}

/// DNS resolver trait for abstracting TXT lookups.
pub trait DnsResolver: Clone + Send + Sync + 'static {
    /// TXT records at `domain`, each record's character-strings concatenated.
    fn query_txt(&self, domain: &str) -> impl Future<Output = Result<Vec<String>, DnsError>> + Send;

    /// Best-effort DNSSEC status of the TXT RRset at `domain`.
    /// `None` means the resolver could not tell.
    fn query_txt_dnssec(&self, domain: &str) -> impl Future<Output = Option<bool>> + Send;
}

/// Hickory DNS resolver implementation.
///
/// Holds a plain resolver for the proof lookup and a DNSSEC-validating one
/// for the secondary signal.
#[derive(Clone)]
pub struct HickoryResolver {
    resolver: TokioResolver,
    validating: TokioResolver,
}

impl HickoryResolver {
    /// Resolver using Cloudflare's public servers, one attempt per query.
    pub fn new(timeout: Duration) -> Self {
        Self::with_config(ResolverConfig::cloudflare(), timeout)
    }

    pub fn with_config(config: ResolverConfig, timeout: Duration) -> Self {
        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        opts.attempts = 1;

        let resolver =
            TokioResolver::builder_with_config(config.clone(), TokioConnectionProvider::default())
                .with_options(opts.clone())
                .build();

        let mut validating_opts = opts;
        validating_opts.validate = true;
        let validating = TokioResolver::builder_with_config(config, TokioConnectionProvider::default())
            .with_options(validating_opts)
            .build();

        Self { resolver, validating }
    }

    fn classify_error(e: &ResolveError, name: &str) -> DnsError {
        classify_lookup_failure(e.is_nx_domain(), e.is_no_records_found(), &e.to_string(), name)
    }
}

/// Map a failed lookup of `name` onto [`DnsError`].
///
/// The error kind decides first. The message is only searched after the
/// queried name is removed from it, so a zone like `timeout.example` cannot
/// masquerade as a resolver timeout.
fn classify_lookup_failure(nx_domain: bool, no_records: bool, message: &str, name: &str) -> DnsError {
    if nx_domain {
        return DnsError::NxDomain;
    }
    if no_records {
        return DnsError::NoRecords;
    }
    let mut msg = message.to_lowercase();
    let name = normalize(name);
    if !name.is_empty() {
        msg = msg.replace(&name, "");
    }
    if msg.contains("nxdomain") {
        DnsError::NxDomain
    } else if msg.contains("no records") || msg.contains("no record found") {
        DnsError::NoRecords
    } else if msg.contains("timed out") || msg.contains("timeout") {
        DnsError::Timeout
    } else if msg.contains("servfail") {
        DnsError::ServFail
    } else {
        DnsError::Other(message.to_string())
    }
}

impl DnsResolver for HickoryResolver {
    async fn query_txt(&self, domain: &str) -> Result<Vec<String>, DnsError> {
        match self.resolver.txt_lookup(domain).await {
            Ok(lookup) => {
                let records: Vec<String> = lookup
                    .iter()
                    .map(|txt| {
                        let bytes: Vec<u8> = txt.txt_data().iter().flat_map(|s| s.iter().copied()).collect();
                        String::from_utf8_lossy(&bytes).into_owned()
                    })
                    .collect();
                Ok(records)
            }
            Err(e) => Err(Self::classify_error(&e, domain)),
        }
    }

    async fn query_txt_dnssec(&self, domain: &str) -> Option<bool> {
        match self.validating.txt_lookup(domain).await {
            Ok(_) => Some(true),
            Err(e) => match Self::classify_error(&e, domain) {
                DnsError::Timeout => None,
                // The plain lookup already answered, so a failure here is a
                // validation failure rather than a missing record.
                _ => Some(false),
            },
        }
    }
}

/// Mock DNS resolver for testing
#[derive(Clone, Default)]
pub struct MockResolver {
    txt_records: Arc<Mutex<HashMap<String, Vec<String>>>>,
    failures: Arc<Mutex<HashMap<String, DnsError>>>,
    dnssec: Arc<Mutex<HashMap<String, bool>>>,
    delay: Arc<Mutex<Option<Duration>>>,
}

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_txt(&self, domain: &str, records: Vec<String>) {
        locked(&self.txt_records).insert(domain.to_lowercase(), records);
    }

    pub fn set_nxdomain(&self, domain: &str) {
        self.set_error(domain, DnsError::NxDomain);
    }

    pub fn set_error(&self, domain: &str, error: DnsError) {
        locked(&self.failures).insert(domain.to_lowercase(), error);
    }

    pub fn set_dnssec(&self, domain: &str, validated: bool) {
        locked(&self.dnssec).insert(domain.to_lowercase(), validated);
    }

    /// Delay every answer, for timeout tests.
    pub fn set_delay(&self, delay: Duration) {
        *locked(&self.delay) = Some(delay);
    }

    async fn wait(&self) {
        let delay = *locked(&self.delay);
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
    }
}

impl DnsResolver for MockResolver {
    async fn query_txt(&self, domain: &str) -> Result<Vec<String>, DnsError> {
        self.wait().await;
        let domain_lower = domain.to_lowercase();
        if let Some(err) = locked(&self.failures).get(&domain_lower) {
            return Err(err.clone());
        }
        match locked(&self.txt_records).get(&domain_lower) {
            Some(records) => Ok(records.clone()),
            None => Err(DnsError::NxDomain),
        }
    }

    async fn query_txt_dnssec(&self, domain: &str) -> Option<bool> {
        locked(&self.dnssec).get(&domain.to_lowercase()).copied()
    }
}
