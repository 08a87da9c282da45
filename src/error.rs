// src/error.rs
use std::time::Duration;

/// Failures surfaced by the fetch client. Analyzers turn these into an
/// `AnalysisResult` status; they never escape an analyzer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    /// Transport failure (connect, DNS, timeout) after all retries.
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// HTTP 429, or the endpoint is still inside its cooldown window.
    #[error("rate limited{}", fmt_retry_after(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    /// Any other non-2xx status.
    #[error("service error: HTTP {0}")]
    ServiceError(u16),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

fn fmt_retry_after(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(" (retry after {}s)", d.as_secs()),
        None => String::new(),
    }
}
