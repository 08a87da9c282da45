use crate::fetch::FetchOptions;
use dotenvy::dotenv;
use eyre::{eyre, Result};
use std::{env, fmt, str::FromStr, time::Duration};
use tracing::info;

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub latest_coin_url: String,
    pub coins_url: String,  // `/{mint}` appended
    pub trades_url: String, // `/{mint}` appended
    pub sol_price_url: String,
    pub social_url: String,
    pub classifier_url: String,
}

#[derive(Clone)]
pub struct ApiKeys {
    pub classifier: String,
    pub social: String,
    pub market: Option<String>,
}

// Keys stay out of logs.
impl fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeys")
            .field("classifier", &"<redacted>")
            .field("social", &"<redacted>")
            .field("market", &self.market.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Warning-flag policy values.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    /// N1: accounts younger than this many days are "new".
    pub new_account_days: i64,
    /// R1: follower/following ratio below this is "low organic following".
    pub low_follower_ratio: f64,
    /// Website AI-content score above this raises a flag.
    pub ai_content_score: f64,
    /// Rungs climbed per triggered flag.
    pub escalation_step: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            new_account_days: 30,
            low_follower_ratio: 0.1,
            ai_content_score: 0.7,
            escalation_step: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub endpoints: Endpoints,
    pub api_keys: ApiKeys,
    pub timeout_seconds: u64,
    pub page_timeout_seconds: u64,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub rate_limit_cooldown_seconds: u64,
    /// Page bodies are cut at this many bytes before text extraction.
    pub page_max_bytes: usize,
    /// Decimal places of the platform's SOL amounts (lamports: 9).
    pub sol_decimals: u32,
    /// Decimal places of the platform's raw token amounts.
    pub token_decimals: u32,
    pub thresholds: Thresholds,
    pub report_text_truncation_limit: usize,
    pub min_content_length: usize,
    pub trade_history_window_size: usize,
    pub poll_interval_seconds: u64,
}

impl Config {
    /// Options for API calls.
    pub fn api_fetch(&self) -> FetchOptions {
        self.fetch_with_timeout(self.timeout_seconds, None)
    }

    /// Options for dereferencing a token's website: shorter timeout.
    pub fn page_fetch(&self) -> FetchOptions {
        self.fetch_with_timeout(self.page_timeout_seconds, Some(self.page_max_bytes))
    }

    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_secs(self.rate_limit_cooldown_seconds)
    }

    fn fetch_with_timeout(&self, secs: u64, max_body_bytes: Option<usize>) -> FetchOptions {
        FetchOptions {
            timeout: Duration::from_secs(secs),
            max_retries: self.max_retries,
            backoff_base: self.backoff_base,
            max_body_bytes,
        }
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Seconds as a float; unparseable falls back to `default`, but a value
/// that parses and is not a usable delay (negative, NaN, inf, huge) is fatal.
fn backoff_from(raw: Option<String>, default: f64) -> Result<Duration> {
    let secs = raw
        .and_then(|v| v.trim().parse::<f64>().ok())
        .unwrap_or(default);
    Duration::try_from_secs_f64(secs)
        .map_err(|e| eyre!("BACKOFF_BASE_SECONDS={} is not a usable delay: {}", secs, e))
}

fn required_key(name: &str) -> Result<String> {
    env::var(name)
        .or_else(|_| env::var("RAPIDAPI_KEY")) // shared RapidAPI key
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| eyre!("missing API key: set {} or RAPIDAPI_KEY", name))
}

pub fn load() -> Result<Config> {
    dotenv().ok(); // ✅ Load from .env file

    let endpoints = Endpoints {
        latest_coin_url: var_or(
            "PUMP_FUN_LATEST_URL",
            "https://frontend-api.pump.fun/coins/latest",
        ),
        coins_url: var_or("PUMP_FUN_COINS_URL", "https://frontend-api.pump.fun/coins"),
        trades_url: var_or(
            "PUMP_FUN_TRADES_URL",
            "https://frontend-api.pump.fun/trades/all",
        ),
        sol_price_url: var_or(
            "PUMP_FUN_SOL_PRICE_URL",
            "https://frontend-api.pump.fun/sol-price",
        ),
        social_url: var_or(
            "TWITTER_API_URL",
            "https://twitter-api45.p.rapidapi.com/screenname.php",
        ),
        classifier_url: var_or(
            "AI_DETECTOR_API_URL",
            "https://ai-content-detector6.p.rapidapi.com/v1/ai-content-detector",
        ),
    };

    // ✅ Missing keys are fatal at startup, never per token
    let api_keys = ApiKeys {
        classifier: required_key("AI_DETECTOR_API_KEY")?,
        social: required_key("TWITTER_API_KEY")?,
        market: env::var("PUMP_FUN_API_KEY").ok().filter(|k| !k.is_empty()),
    };

    let defaults = Thresholds::default();
    let thresholds = Thresholds {
        new_account_days: parse_or("NEW_ACCOUNT_DAYS", defaults.new_account_days),
        low_follower_ratio: parse_or("LOW_FOLLOWER_RATIO", defaults.low_follower_ratio),
        ai_content_score: parse_or("AI_CONTENT_THRESHOLD", defaults.ai_content_score),
        escalation_step: parse_or("RISK_ESCALATION_STEP", defaults.escalation_step),
    };

    let cfg = Config {
        endpoints,
        api_keys,
        timeout_seconds: parse_or("TIMEOUT_SECONDS", 10),
        page_timeout_seconds: parse_or("PAGE_TIMEOUT_SECONDS", 5),
        max_retries: parse_or("MAX_RETRIES", 2),
        backoff_base: backoff_from(env::var("BACKOFF_BASE_SECONDS").ok(), 0.5)?,
        rate_limit_cooldown_seconds: parse_or("RATE_LIMIT_COOLDOWN_SECONDS", 60),
        page_max_bytes: parse_or("PAGE_MAX_BYTES", 1_000_000),
        sol_decimals: parse_or("SOL_DECIMALS", 9),
        token_decimals: parse_or("TOKEN_DECIMALS", 6),
        thresholds,
        report_text_truncation_limit: parse_or("TEXT_TRUNCATION_LIMIT", 5000),
        min_content_length: parse_or("MIN_CONTENT_LENGTH", 200),
        trade_history_window_size: parse_or("TRADE_HISTORY_WINDOW", 20),
        poll_interval_seconds: parse_or("POLL_INTERVAL_SECONDS", 10),
    };

    info!("Loaded config: {:?}", cfg);

    Ok(cfg)
}
