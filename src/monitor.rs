use crate::aggregator::Pipeline;
use crate::config::Config;
use crate::error::FetchError;
use crate::market::MarketDataFetcher;
use crate::models::RiskReport;
use eyre::Result;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// One cycle: read the feed and evaluate its token, unless it is the mint
/// evaluated last time. `Ok(None)` means nothing new.
pub async fn poll_once(
    discovery: &MarketDataFetcher,
    feed_url: &str,
    pipeline: &Pipeline,
    last_mint: &mut Option<String>,
) -> Result<Option<RiskReport>, FetchError> {
    let token = discovery.latest_token(feed_url).await?;

    if last_mint.as_deref() == Some(token.address.as_str()) {
        debug!("No new token since last cycle ({})", token.address);
        return Ok(None);
    }

    *last_mint = Some(token.address.clone());
    Ok(Some(pipeline.evaluate(token).await))
}

/// Poll the launch feed forever: one token per cycle, each cycle runs to
/// completion before the next starts.
pub async fn run(cfg: Config, discovery: MarketDataFetcher, pipeline: Pipeline) -> Result<()> {
    let poll = Duration::from_secs(cfg.poll_interval_seconds);
    let mut retry_delay = 10; // feed backoff in seconds
    let mut last_mint: Option<String> = None;

    info!("Monitor started, polling every {:?}", poll);

    loop {
        info!("Checking latest token...");

        match poll_once(&discovery, &cfg.endpoints.latest_coin_url, &pipeline, &mut last_mint).await {
            Ok(report) => {
                retry_delay = 10; // reset after success

                if let Some(report) = report {
                    println!("\n{report}");
                }

                sleep(poll).await;
            }
            Err(e) => {
                warn!("Feed failed this round: {}. Retrying in {}s", e, retry_delay);
                sleep(Duration::from_secs(retry_delay)).await;
                retry_delay = (retry_delay * 2).min(120);
            }
        }
    }
}
