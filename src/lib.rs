//! Tor relay operator proof validation: DNS-RSA and URI-RSA.
//!
//! Relays declare an operator domain in their ContactInfo; the validator
//! checks that the domain publishes proof of running the relay. DNS and
//! HTTP sit behind the `DnsResolver` and `HttpFetcher` traits, so tests and
//! callers can substitute their own transports.

pub mod common;
pub mod config;
pub mod contact;
pub mod directory;
pub mod proof;
pub mod report;
pub mod run;
pub mod stats;

pub use config::{TlsMode, ValidatorConfig};
pub use contact::{parse_contact, ProofDeclaration, ProofMethod, ProofType};
pub use proof::{ValidationOutcome, ValidationStatus};
pub use report::RunReport;
pub use run::{LiveOrchestrator, RelayRecord, RunError, ValidationOrchestrator, ValidationRun};
pub use stats::{aggregate, Statistics};
