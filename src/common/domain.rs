use url::Url;

/// Normalize a domain: lowercase + strip trailing dot.
pub fn normalize(domain: &str) -> String {
    let d = domain.to_ascii_lowercase();
    d.strip_suffix('.').unwrap_or(&d).to_string()
}

/// Compare two domains after normalization.
pub fn domains_equal(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

/// Check if `child` is a subdomain of `parent` (after normalization).
/// A domain is NOT a subdomain of itself.
pub fn is_subdomain_of(child: &str, parent: &str) -> bool {
    let nc = normalize(child);
    let np = normalize(parent);
    if nc == np {
        return false;
    }
    nc.ends_with(&format!(".{}", np))
}

/// True if `host` is `origin` or one of its subdomains.
pub fn within_domain(host: &str, origin: &str) -> bool {
    domains_equal(host, origin) || is_subdomain_of(host, origin)
}

/// Split an optional `http://`/`https://` scheme off a target.
/// Returns `(scheme, rest)`; the scheme is lowercased.
pub fn split_scheme(target: &str) -> (Option<String>, &str) {
    match target.split_once("://") {
        Some((scheme, rest)) => (Some(scheme.to_ascii_lowercase()), rest),
        None => (None, target),
    }
}

/// Extract the normalized host from a domain or URL target.
///
/// A target without a scheme is read as `https://<target>`, so hosts come out
/// exactly as the URI checker's URL parsing sees them (IPv6 literals keep
/// their brackets). Returns None when there is no usable host.
pub fn host_from_target(target: &str) -> Option<String> {
    let target = target.trim();
    let url = match split_scheme(target) {
        (Some(_), _) => Url::parse(target),
        (None, _) => Url::parse(&format!("https://{}", target)),
    }
    .ok()?;
    let host = normalize(url.host_str()?);
    if host.is_empty() {
        return None;
    }
    Some(host)
}
