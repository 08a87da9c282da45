// src/models.rs
use crate::error::FetchError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fmt;

/// Bonding-curve balances as the launch platform reports them.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Reserves {
    #[serde(rename = "virtual_sol_reserves", default)]
    pub virtual_sol: Decimal,
    #[serde(rename = "virtual_token_reserves", default)]
    pub virtual_token: Decimal,
    #[serde(rename = "real_sol_reserves", default)]
    pub real_sol: Decimal,
    #[serde(rename = "real_token_reserves", default)]
    pub real_token: Decimal,
}

/// One swap against the bonding curve.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Trade {
    pub signature: String,
    #[allow(dead_code)]
    #[serde(default)]
    pub mint: String,
    pub sol_amount: Decimal,
    pub token_amount: Decimal,
    pub is_buy: bool,
    #[serde(default)]
    pub user: String,
    /// Unix seconds.
    pub timestamp: i64,
}

/// A newly launched token as seen by one monitoring cycle. Built once from
/// the feed and never mutated; the next cycle fetches a fresh one.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenRecord {
    #[serde(rename = "mint")]
    pub address: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub creator: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(rename = "twitter", default)]
    pub social_handle: Option<String>,
    #[serde(rename = "total_supply", default)]
    pub supply: Decimal,
    #[serde(flatten)]
    pub reserves: Reserves,
    #[serde(default)]
    pub recent_trades: Vec<Trade>,
}

/// Bounded window of recent trades, most recent first. Consumed once.
#[derive(Debug)]
pub struct TradeHistory {
    trades: std::vec::IntoIter<Trade>,
}

impl TradeHistory {
    pub fn new(mut trades: Vec<Trade>, window: usize) -> Self {
        trades.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        trades.truncate(window);
        Self {
            trades: trades.into_iter(),
        }
    }

    /// Trades not yet pulled from the iterator.
    pub fn remaining(&self) -> &[Trade] {
        self.trades.as_slice()
    }
}

impl Iterator for TradeHistory {
    type Item = Trade;

    fn next(&mut self) -> Option<Trade> {
        self.trades.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.trades.size_hint()
    }
}

impl ExactSizeIterator for TradeHistory {}

#[derive(Debug)]
pub struct MarketSnapshot {
    /// Price per token in SOL.
    pub price: Decimal,
    /// True when price came from the reserve ratio, not the platform.
    pub price_derived: bool,
    pub circulating_supply: Decimal,
    pub market_cap: Decimal,
    pub usd_market_cap: Option<Decimal>,
    pub reserves: Reserves,
    pub trades: TradeHistory,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SocialMetrics {
    pub handle: String,
    pub account_age_days: Option<i64>,
    pub followers: u64,
    pub following: u64,
    pub follower_following_ratio: f64,
    /// Posts per day over the account's lifetime.
    pub engagement_rate: Option<f64>,
    pub tweet_count: Option<u64>,
    pub verified: bool,
    pub location: Option<String>,
}

#[derive(Debug)]
pub enum Finding {
    /// Likelihood in [0, 1] that the site text is machine generated.
    AiContent { score: f64 },
    Social(SocialMetrics),
    Market(MarketSnapshot),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Analyzer {
    Market,
    Website,
    Social,
}

impl fmt::Display for Analyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Analyzer::Market => "market",
            Analyzer::Website => "website",
            Analyzer::Social => "social",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Degraded,
    Unavailable,
    InvalidInput,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Ok => "ok",
            Status::Degraded => "degraded",
            Status::Unavailable => "unavailable",
            Status::InvalidInput => "invalid_input",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningFlag {
    NewAccount,
    LowOrganicFollowing,
    AiGeneratedContent,
}

impl fmt::Display for WarningFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WarningFlag::NewAccount => "new account",
            WarningFlag::LowOrganicFollowing => "low organic following",
            WarningFlag::AiGeneratedContent => "ai generated content",
        })
    }
}

/// A flag together with the analyzer that raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggeredFlag {
    pub flag: WarningFlag,
    pub origin: Analyzer,
}

/// Outcome of one analyzer. A finding exists only when status is `Ok`,
/// and a reason exists only when it is not; the constructors enforce both.
#[derive(Debug)]
pub struct AnalysisResult {
    analyzer: Analyzer,
    status: Status,
    finding: Option<Finding>,
    reason: Option<String>,
    flags: Vec<WarningFlag>,
}

impl AnalysisResult {
    pub fn ok(analyzer: Analyzer, finding: Finding, flags: Vec<WarningFlag>) -> Self {
        Self {
            analyzer,
            status: Status::Ok,
            finding: Some(finding),
            reason: None,
            flags,
        }
    }

    pub fn degraded(analyzer: Analyzer, reason: impl Into<String>) -> Self {
        Self::failed(analyzer, Status::Degraded, reason.into())
    }

    pub fn unavailable(analyzer: Analyzer, reason: impl Into<String>) -> Self {
        Self::failed(analyzer, Status::Unavailable, reason.into())
    }

    pub fn invalid_input(analyzer: Analyzer, reason: impl Into<String>) -> Self {
        Self::failed(analyzer, Status::InvalidInput, reason.into())
    }

    /// Rate limits degrade, bad input is reported as such, anything else
    /// means the source is unavailable.
    pub fn from_fetch_error(analyzer: Analyzer, err: &FetchError) -> Self {
        match err {
            FetchError::RateLimited { .. } => Self::degraded(analyzer, "rate limited"),
            FetchError::InvalidInput(_) => Self::invalid_input(analyzer, err.to_string()),
            FetchError::NetworkFailure(_)
            | FetchError::ServiceError(_)
            | FetchError::MalformedResponse(_) => Self::unavailable(analyzer, err.to_string()),
        }
    }

    fn failed(analyzer: Analyzer, status: Status, reason: String) -> Self {
        Self {
            analyzer,
            status,
            finding: None,
            reason: Some(reason),
            flags: Vec::new(),
        }
    }

    pub fn analyzer(&self) -> Analyzer {
        self.analyzer
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn finding(&self) -> Option<&Finding> {
        self.finding.as_ref()
    }

    #[cfg(test)]
    pub fn into_finding(self) -> Option<Finding> {
        self.finding
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn flags(&self) -> &[WarningFlag] {
        &self.flags
    }
}

/// Ordinal risk summary. `Unknown` sits outside the low..high ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Unknown,
}

impl RiskLevel {
    /// Move `steps` rungs up the low→medium→high ladder, capped at high.
    pub fn escalate(self, steps: usize) -> Self {
        let rung: usize = match self {
            RiskLevel::Low => 0,
            RiskLevel::Medium => 1,
            RiskLevel::High => 2,
            RiskLevel::Unknown => return RiskLevel::Unknown,
        };
        match rung.saturating_add(steps) {
            0 => RiskLevel::Low,
            1 => RiskLevel::Medium,
            _ => RiskLevel::High,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Unknown => "unknown",
        })
    }
}

/// Everything one `evaluate` call learned about a token.
#[derive(Debug)]
pub struct RiskReport {
    pub token: TokenRecord,
    pub results: Vec<AnalysisResult>,
    pub level: RiskLevel,
    pub flags: Vec<TriggeredFlag>,
    pub generated_at: DateTime<Utc>,
}

impl RiskReport {
    #[cfg(test)]
    pub fn result(&self, analyzer: Analyzer) -> Option<&AnalysisResult> {
        self.results.iter().find(|r| r.analyzer() == analyzer)
    }
}
