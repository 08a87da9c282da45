// src/social.rs
use crate::config::{Config, Thresholds};
use crate::error::FetchError;
use crate::fetch::{FetchClient, FetchOptions, Request};
use crate::models::{AnalysisResult, Analyzer, Finding, SocialMetrics, WarningFlag};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};

/// Account metadata as returned by the social-metadata service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default, alias = "sub_count")]
    pub followers_count: Option<u64>,
    #[serde(default, alias = "friends_count", alias = "friends")]
    pub following_count: Option<u64>,
    #[serde(default)]
    pub statuses_count: Option<u64>,
    #[serde(default)]
    pub verified: Option<bool>,
    #[serde(default)]
    pub location: Option<String>,
}

/// Pull a bare handle out of `@name`, `name` or a profile URL.
pub fn normalize_handle(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let segment = if raw.contains("://") {
        let url = url::Url::parse(raw).ok()?;
        url.path_segments()?
            .filter(|s| !s.is_empty())
            .last()?
            .to_string()
    } else {
        let without_query = raw.split(['?', '#']).next().unwrap_or_default();
        without_query
            .split('/')
            .filter(|s| !s.is_empty())
            .last()?
            .to_string()
    };

    let handle = segment.trim_start_matches('@').trim();
    if handle.is_empty() {
        None
    } else {
        Some(handle.to_string())
    }
}

/// Accepts RFC 3339, Twitter's `Sat Jul 04 20:18:54 +0000 2009`, and
/// `2024-01-01 12:00:00` (taken as UTC).
pub fn parse_created_at(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%a %b %d %H:%M:%S %z %Y"))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

impl SocialMetrics {
    pub fn from_profile(
        handle: &str,
        profile: &Profile,
        now: DateTime<Utc>,
    ) -> Result<Self, FetchError> {
        let (Some(followers), Some(following)) = (profile.followers_count, profile.following_count)
        else {
            return Err(FetchError::MalformedResponse(
                "profile lacks follower/following counts".into(),
            ));
        };

        let account_age_days = match profile.created_at.as_deref() {
            Some(raw) => match parse_created_at(raw) {
                Some(created) => Some((now - created).num_days().max(0)),
                None => {
                    warn!("Unrecognised creation date {:?} for @{}", raw, handle);
                    None
                }
            },
            None => None,
        };

        // following == 0 divides by 1, never skipped
        let follower_following_ratio = followers as f64 / following.max(1) as f64;

        let engagement_rate = match (profile.statuses_count, account_age_days) {
            (Some(tweets), Some(age)) => Some(tweets as f64 / age.max(1) as f64),
            _ => None,
        };

        Ok(SocialMetrics {
            handle: handle.to_string(),
            account_age_days,
            followers,
            following,
            follower_following_ratio,
            engagement_rate,
            tweet_count: profile.statuses_count,
            verified: profile.verified.unwrap_or(false),
            location: profile.location.clone().filter(|l| !l.is_empty()),
        })
    }

    /// Flags are additive: any number may fire at once.
    pub fn flags(&self, thresholds: &Thresholds) -> Vec<WarningFlag> {
        let mut flags = Vec::new();
        if matches!(self.account_age_days, Some(age) if age < thresholds.new_account_days) {
            flags.push(WarningFlag::NewAccount);
        }
        if self.follower_following_ratio < thresholds.low_follower_ratio {
            flags.push(WarningFlag::LowOrganicFollowing);
        }
        flags
    }
}

/// Derives account-age and following signals for a token's social handle.
#[derive(Debug, Clone)]
pub struct SocialAnalyzer {
    client: FetchClient,
    url: String,
    api_key: String,
    opts: FetchOptions,
    thresholds: Thresholds,
}

impl SocialAnalyzer {
    pub fn new(client: FetchClient, cfg: &Config) -> Self {
        Self {
            client,
            url: cfg.endpoints.social_url.clone(),
            api_key: cfg.api_keys.social.clone(),
            opts: cfg.api_fetch(),
            thresholds: cfg.thresholds,
        }
    }

    pub async fn analyze(&self, handle: &str) -> AnalysisResult {
        let Some(handle) = normalize_handle(handle) else {
            return AnalysisResult::invalid_input(Analyzer::Social, "missing social handle");
        };

        let req = Request::get(&self.url)
            .query("screenname", &handle)
            .rapidapi_key(&self.api_key);

        let metrics = match self.client.fetch_json::<Profile>(&req, &self.opts).await {
            Ok(profile) => SocialMetrics::from_profile(&handle, &profile, Utc::now()),
            Err(e) => Err(e),
        };
        let metrics = match metrics {
            Ok(metrics) => metrics,
            Err(e) => {
                warn!("Twitter analysis for @{} failed: {}", handle, e);
                return AnalysisResult::from_fetch_error(Analyzer::Social, &e);
            }
        };

        info!(
            "Twitter analysis for @{}: age {:?} days, {} followers, {} following, ratio {:.3}",
            handle,
            metrics.account_age_days,
            metrics.followers,
            metrics.following,
            metrics.follower_following_ratio
        );

        let flags = metrics.flags(&self.thresholds);
        AnalysisResult::ok(Analyzer::Social, Finding::Social(metrics), flags)
    }
}
