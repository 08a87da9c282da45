mod aggregator;
mod config;
mod display;
mod error;
mod fetch;
mod market;
mod models;
mod monitor;
mod rate_limit;
mod social;
mod validator;
mod website;


use aggregator::Pipeline;
use fetch::FetchClient;
use market::MarketDataFetcher;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stdout)
        .with_target(false)
        .init();

    info!("Token risk monitor starting...");

    // Missing API keys stop us here, before any token is touched
    let cfg = config::load()?;
    info!("  Feed: {}", cfg.endpoints.latest_coin_url);
    info!("  Poll interval: {}s", cfg.poll_interval_seconds);
    info!(
        "  Thresholds: new account < {} days, follower ratio < {}, AI score > {}",
        cfg.thresholds.new_account_days,
        cfg.thresholds.low_follower_ratio,
        cfg.thresholds.ai_content_score
    );

    // One client, one RateLimitState for the whole process
    let client = FetchClient::new(cfg.rate_limit_cooldown())?;
    let discovery = MarketDataFetcher::new(client.clone(), &cfg);
    let pipeline = Pipeline::new(client, &cfg);

    tokio::select! {
        res = monitor::run(cfg, discovery, pipeline) => {
            if let Err(e) = res {
                error!("Monitor error: {:?}", e);
                return Err(e);
            }
        }
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received, stopping...");
        }
    }

    info!("Token risk monitor stopped.");
    Ok(())
}
