use std::fmt;

use serde::{Deserialize, Serialize};

/// Proof mechanism declared in a relay's contact field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProofType {
    DnsRsa,
    UriRsa,
    None,
}

impl ProofType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProofType::DnsRsa => "dns-rsa",
            ProofType::UriRsa => "uri-rsa",
            ProofType::None => "none",
        }
    }
}

impl fmt::Display for ProofType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A checkable mechanism: the proof types that name a network check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProofMethod {
    DnsRsa,
    UriRsa,
}

impl ProofMethod {
    /// Parse a `proof:` value. Only the exact spellings are accepted.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "dns-rsa" => Some(ProofMethod::DnsRsa),
            "uri-rsa" => Some(ProofMethod::UriRsa),
            _ => None,
        }
    }
}

impl From<ProofMethod> for ProofType {
    fn from(method: ProofMethod) -> Self {
        match method {
            ProofMethod::DnsRsa => ProofType::DnsRsa,
            ProofMethod::UriRsa => ProofType::UriRsa,
        }
    }
}

impl fmt::Display for ProofMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(ProofType::from(*self).as_str())
    }
}

/// Ownership-proof declaration parsed from a contact string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofDeclaration {
    /// No recognized `proof:` token.
    None,
    /// A proof was claimed but the declaration is unusable.
    Malformed {
        method: ProofMethod,
        reason: String,
        version: Option<String>,
    },
    /// A usable claim: `target` is a domain or absolute URL.
    Claimed {
        target: String,
        method: ProofMethod,
        version: Option<String>,
    },
}

impl ProofDeclaration {
    pub fn proof_type(&self) -> ProofType {
        match self {
            ProofDeclaration::None => ProofType::None,
            ProofDeclaration::Malformed { method, .. }
            | ProofDeclaration::Claimed { method, .. } => (*method).into(),
        }
    }

    pub fn method(&self) -> Option<ProofMethod> {
        match self {
            ProofDeclaration::None => None,
            ProofDeclaration::Malformed { method, .. }
            | ProofDeclaration::Claimed { method, .. } => Some(*method),
        }
    }

    pub fn target(&self) -> Option<&str> {
        match self {
            ProofDeclaration::Claimed { target, .. } => Some(target),
            _ => None,
        }
    }

    pub fn version(&self) -> Option<&str> {
        match self {
            ProofDeclaration::None => None,
            ProofDeclaration::Malformed { version, .. }
            | ProofDeclaration::Claimed { version, .. } => version.as_deref(),
        }
    }

    pub fn is_claimed(&self) -> bool {
        matches!(self, ProofDeclaration::Claimed { .. })
    }
}
