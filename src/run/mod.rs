pub mod orchestrator;
pub mod types;

pub use orchestrator::{LiveOrchestrator, ValidationOrchestrator};
pub use types::{Progress, RelayRecord, ValidationRun};

use thiserror::Error;

use crate::common::http::FetchError;
use crate::config::ConfigError;

/// Failure to start a run. Per-relay failures never surface here.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("relay #{index} has an invalid fingerprint '{fingerprint}'")]
    InvalidFingerprint { index: usize, fingerprint: String },
    #[error("duplicate fingerprint {0}")]
    DuplicateFingerprint(String),
    #[error("HTTP client setup failed: {0}")]
    Http(#[from] FetchError),
}
