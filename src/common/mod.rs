//! Common infrastructure shared by the contact parser, proof checkers and
//! orchestrator: the DNS and HTTP transport seams plus small helpers.

pub mod dns;
pub mod domain;
pub mod fingerprint;
pub mod http;
