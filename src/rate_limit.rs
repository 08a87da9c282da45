// src/rate_limit.rs
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// What we know about one endpoint's quota.
#[derive(Debug, Clone, Default)]
pub struct EndpointState {
    pub last_call: Option<Instant>,
    pub remaining_quota: Option<u64>,
    pub cooldown_until: Option<Instant>,
}

/// Per-endpoint call bookkeeping, shared by every analyzer through the
/// fetch client. Starts empty, lives for the process, never persisted.
#[derive(Debug, Default)]
pub struct RateLimitState {
    endpoints: HashMap<String, EndpointState>,
}

impl RateLimitState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, endpoint: &str) -> Option<&EndpointState> {
        self.endpoints.get(endpoint)
    }

    /// Time left in the endpoint's cooldown, if it is currently throttled.
    pub fn cooldown_remaining(&self, endpoint: &str, now: Instant) -> Option<Duration> {
        let until = self.endpoints.get(endpoint)?.cooldown_until?;
        until.checked_duration_since(now).filter(|d| !d.is_zero())
    }

    /// Record a completed call. A reported quota of zero starts a cooldown.
    pub fn record_call(
        &mut self,
        endpoint: &str,
        now: Instant,
        remaining_quota: Option<u64>,
        default_cooldown: Duration,
    ) {
        let entry = self.endpoints.entry(endpoint.to_string()).or_default();
        entry.last_call = Some(now);
        if remaining_quota.is_some() {
            entry.remaining_quota = remaining_quota;
        }
        if remaining_quota == Some(0) {
            entry.cooldown_until = Some(now + default_cooldown);
        }
    }

    /// Record a 429. The cooldown never shrinks an existing, longer window.
    pub fn mark_limited(&mut self, endpoint: &str, now: Instant, cooldown: Duration) {
        let entry = self.endpoints.entry(endpoint.to_string()).or_default();
        entry.last_call = Some(now);
        entry.remaining_quota = Some(0);
        let until = now + cooldown;
        entry.cooldown_until = Some(match entry.cooldown_until {
            Some(existing) if existing > until => existing,
            _ => until,
        });
    }
}
