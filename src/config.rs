//! Validator configuration.
//!
//! Every field has a default, so a partial JSON/TOML document deserializes
//! into a complete config.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How the URI checker treats servers with outdated TLS setups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TlsMode {
    /// Only the default, verified TLS client is used.
    Strict,
    /// After a TLS failure, retry once with certificate and hostname
    /// verification off. The retry is recorded in the outcome's detail steps.
    #[default]
    LegacyCompatible,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Maximum number of relay checks in flight at once.
    pub concurrency: usize,
    pub dns_timeout_ms: u64,
    pub http_timeout_ms: u64,
    pub max_redirects: usize,
    pub tls_mode: TlsMode,
    /// Refuse redirects that leave the declared domain.
    pub same_host_redirects: bool,
    /// Attempts per network check; 1 disables retries.
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            dns_timeout_ms: 5_000,
            http_timeout_ms: 10_000,
            max_redirects: 3,
            tls_mode: TlsMode::LegacyCompatible,
            same_host_redirects: true,
            retry_attempts: 1,
            retry_backoff_ms: 500,
        }
    }
}

impl ValidatorConfig {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n;
        self
    }

    pub fn dns_timeout(mut self, timeout: Duration) -> Self {
        self.dns_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout_ms = timeout.as_millis() as u64;
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

    pub fn retries(mut self, attempts: u32, backoff: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_backoff_ms = backoff.as_millis() as u64;
        self
    }

    pub fn dns_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.dns_timeout_ms)
    }

    pub fn http_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Zero { field: "concurrency" });
        }
        if self.dns_timeout_ms == 0 {
            return Err(ConfigError::Zero { field: "dns_timeout_ms" });
        }
        if self.http_timeout_ms == 0 {
            return Err(ConfigError::Zero { field: "http_timeout_ms" });
        }
        if self.retry_attempts == 0 {
            return Err(ConfigError::Zero { field: "retry_attempts" });
        }
        Ok(())
    }
}
