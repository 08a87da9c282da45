use crate::config::Config;
use crate::fetch::FetchClient;
use crate::market::MarketDataFetcher;
use crate::models::{
    AnalysisResult, RiskLevel, RiskReport, Status, TokenRecord, TriggeredFlag,
};
use crate::social::SocialAnalyzer;
use crate::website::WebsiteAnalyzer;
use chrono::Utc;
use tracing::info;

/// Every flag raised by any analyzer, tagged with where it came from.
pub fn collect_flags(results: &[AnalysisResult]) -> Vec<TriggeredFlag> {
    results
        .iter()
        .flat_map(|r| {
            r.flags().iter().map(move |&flag| TriggeredFlag {
                flag,
                origin: r.analyzer(),
            })
        })
        .collect()
}

/// Start at low, climb `step` rungs per flag, cap at high. Unknown only
/// when no source answered at all.
pub fn overall_level(results: &[AnalysisResult], flag_count: usize, step: usize) -> RiskLevel {
    if results.iter().all(|r| r.status() == Status::Unavailable) {
        return RiskLevel::Unknown;
    }
    RiskLevel::Low.escalate(flag_count.saturating_mul(step))
}

/// Runs market, website and social analysis for one token, in that order,
/// and folds whatever came back into a report. Never aborts early.
#[derive(Debug, Clone)]
pub struct Pipeline {
    market: MarketDataFetcher,
    website: WebsiteAnalyzer,
    social: SocialAnalyzer,
    escalation_step: usize,
}

impl Pipeline {
    pub fn new(client: FetchClient, cfg: &Config) -> Self {
        Self {
            market: MarketDataFetcher::new(client.clone(), cfg),
            website: WebsiteAnalyzer::new(client.clone(), cfg),
            social: SocialAnalyzer::new(client, cfg),
            escalation_step: cfg.thresholds.escalation_step,
        }
    }

    pub async fn evaluate(&self, token: TokenRecord) -> RiskReport {
        info!("🔍 Evaluating {} ({})", token.symbol, token.address);

        let market = self.market.fetch(&token.address).await;
        info!("Market: {}", market.status());

        let website = self
            .website
            .analyze(token.website.as_deref().unwrap_or_default())
            .await;
        info!("Website: {}", website.status());

        let social = self
            .social
            .analyze(token.social_handle.as_deref().unwrap_or_default())
            .await;
        info!("Social: {}", social.status());

        let results = vec![market, website, social];
        let flags = collect_flags(&results);
        let level = overall_level(&results, flags.len(), self.escalation_step);

        info!(
            "✅ {} risk {} with {} flag(s)",
            token.address,
            level,
            flags.len()
        );

        RiskReport {
            token,
            results,
            level,
            flags,
            generated_at: Utc::now(),
        }
    }
}
