// src/validator.rs
use url::Url;

/// Structural check run before any URL is dereferenced. No network access.
///
/// Accepts only http/https with a host that contains a dot. `localhost` and
/// other single-label hosts are rejected: a token's public site never lives
/// there.
pub fn validate(candidate: &str) -> bool {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return false;
    }

    let Ok(url) = Url::parse(candidate) else {
        return false;
    };

    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }

    match url.host_str() {
        Some(host) => {
            let host = host.trim_end_matches('.');
            !host.is_empty()
                && host.contains('.')
                && !host.split('.').any(str::is_empty)
                && !host.eq_ignore_ascii_case("localhost")
        }
        None => false,
    }
}
