/// Length of a relay RSA identity fingerprint in hex characters.
pub const FINGERPRINT_LEN: usize = 40;

/// True if `fingerprint` is exactly 40 hex characters (either case).
pub fn is_valid(fingerprint: &str) -> bool {
    fingerprint.len() == FINGERPRINT_LEN && fingerprint.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Case-insensitive search for `fingerprint` inside `haystack`.
pub fn appears_in(haystack: &str, fingerprint: &str) -> bool {
    if fingerprint.is_empty() {
        return false;
    }
    haystack
        .to_ascii_lowercase()
        .contains(&fingerprint.to_ascii_lowercase())
}
