use crate::common::domain::{host_from_target, split_scheme};

use super::types::{ProofDeclaration, ProofMethod};

/// Parse a relay contact string into a proof declaration.
///
/// The contact is split on whitespace; tokens of the form `key:value` with a
/// recognized key (`url`, `aroi-url`, `proof`, `ciissversion`, matched
/// case-insensitively) are collected and everything else is ignored. When a
/// key repeats, the last occurrence wins. Never fails: unusable input
/// degrades to [`ProofDeclaration::None`] or [`ProofDeclaration::Malformed`].
pub fn parse_contact(contact: &str) -> ProofDeclaration {
    let tokens = parse_token_list(contact);

    let proof = last_value(&tokens, &["proof"]);
    let url = last_value(&tokens, &["url", "aroi-url"]);
    let version = last_value(&tokens, &["ciissversion"])
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    // A proof value other than the two mechanisms is no claim at all,
    // regardless of any url token.
    let method = match proof.and_then(ProofMethod::parse) {
        Some(p) => p,
        None => return ProofDeclaration::None,
    };

    let url = match url {
        Some(u) if !u.is_empty() => u,
        _ => {
            return ProofDeclaration::Malformed {
                method,
                reason: format!("proof:{} declared without a url", method),
                version,
            }
        }
    };

    if let Some(reason) = target_defect(url) {
        return ProofDeclaration::Malformed { method, reason, version };
    }

    ProofDeclaration::Claimed {
        target: url.to_string(),
        method,
        version,
    }
}

/// Collect recognized `key:value` tokens in order. Keys are lowercased.
fn parse_token_list(contact: &str) -> Vec<(String, &str)> {
    let mut tokens = Vec::new();
    for token in contact.split_whitespace() {
        let Some((key, value)) = token.split_once(':') else {
            continue;
        };
        let key = key.to_ascii_lowercase();
        match key.as_str() {
            "url" | "aroi-url" | "proof" | "ciissversion" => tokens.push((key, value)),
            _ => {} // unknown keys ignored
        }
    }
    tokens
}

fn last_value<'a>(tokens: &[(String, &'a str)], keys: &[&str]) -> Option<&'a str> {
    tokens
        .iter()
        .rev()
        .find(|(k, _)| keys.contains(&k.as_str()))
        .map(|(_, v)| *v)
}

/// Why a url token cannot be checked, if it cannot.
fn target_defect(url: &str) -> Option<String> {
    let (scheme, _) = split_scheme(url);
    if let Some(scheme) = scheme {
        if scheme != "http" && scheme != "https" {
            return Some(format!("unsupported url scheme '{}' in '{}'", scheme, url));
        }
    }
    if host_from_target(url).is_none() {
        return Some(format!("no host in url '{}'", url));
    }
    None
}
