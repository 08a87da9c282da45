// src/market.rs
use crate::config::Config;
use crate::error::FetchError;
use crate::fetch::{FetchClient, FetchOptions, Request};
use crate::models::{
    AnalysisResult, Analyzer, Finding, MarketSnapshot, Reserves, TokenRecord, Trade, TradeHistory,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Current coin state on the launch platform.
#[derive(Debug, Clone, Deserialize)]
struct CoinState {
    #[serde(rename = "total_supply", default)]
    supply: Decimal,
    #[serde(flatten)]
    reserves: Reserves,
    #[serde(default)]
    price: Option<Decimal>,
    #[serde(default)]
    usd_market_cap: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct SolPrice {
    #[serde(rename = "solPrice")]
    sol_price: Decimal,
}

/// Raw base units to whole units: `raw / 10^decimals`.
fn to_whole(raw: Decimal, decimals: u32) -> Option<Decimal> {
    let unit = 10u64.checked_pow(decimals).map(Decimal::from)?;
    raw.checked_div(unit)
}

fn whole_reserves(raw: &Reserves, sol_decimals: u32, token_decimals: u32) -> Option<Reserves> {
    Some(Reserves {
        virtual_sol: to_whole(raw.virtual_sol, sol_decimals)?,
        virtual_token: to_whole(raw.virtual_token, token_decimals)?,
        real_sol: to_whole(raw.real_sol, sol_decimals)?,
        real_token: to_whole(raw.real_token, token_decimals)?,
    })
}

/// Bonding-curve spot price: virtual SOL over virtual tokens.
pub fn derive_price(reserves: &Reserves) -> Option<Decimal> {
    if reserves.virtual_token.is_zero() {
        return None;
    }
    reserves.virtual_sol.checked_div(reserves.virtual_token)
}

/// Platform-supplied price wins over derivation; the flag says which.
pub fn resolve_price(quoted: Option<Decimal>, reserves: &Reserves) -> Option<(Decimal, bool)> {
    match quoted {
        Some(price) if price > Decimal::ZERO => Some((price, false)),
        _ => derive_price(reserves).map(|p| (p, true)),
    }
}

fn is_mint_address(address: &str) -> bool {
    !address.is_empty() && address.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Talks to the launch platform: token discovery, coin state, trades.
#[derive(Debug, Clone)]
pub struct MarketDataFetcher {
    client: FetchClient,
    coins_url: String,
    trades_url: String,
    sol_price_url: String,
    api_key: Option<String>,
    opts: FetchOptions,
    window: usize,
    sol_decimals: u32,
    token_decimals: u32,
}

impl MarketDataFetcher {
    pub fn new(client: FetchClient, cfg: &Config) -> Self {
        Self {
            client,
            coins_url: cfg.endpoints.coins_url.trim_end_matches('/').to_string(),
            trades_url: cfg.endpoints.trades_url.trim_end_matches('/').to_string(),
            sol_price_url: cfg.endpoints.sol_price_url.clone(),
            api_key: cfg.api_keys.market.clone(),
            opts: cfg.api_fetch(),
            window: cfg.trade_history_window_size,
            sol_decimals: cfg.sol_decimals,
            token_decimals: cfg.token_decimals,
        }
    }

    fn request(&self, url: String) -> Request {
        match &self.api_key {
            Some(key) => Request::get(url).header("x-api-key", key),
            None => Request::get(url),
        }
    }

    /// Most recently launched token, as published by the platform feed.
    pub async fn latest_token(&self, feed_url: &str) -> Result<TokenRecord, FetchError> {
        let token: TokenRecord = self
            .client
            .fetch_json(&self.request(feed_url.to_string()), &self.opts)
            .await?;
        info!("🆕 Latest token {} ({})", token.symbol, token.address);
        Ok(token)
    }

    pub async fn fetch(&self, address: &str) -> AnalysisResult {
        if !is_mint_address(address) {
            return AnalysisResult::invalid_input(
                Analyzer::Market,
                format!("invalid token address {address:?}"),
            );
        }

        let state: CoinState = match self
            .client
            .fetch_json(&self.request(format!("{}/{}", self.coins_url, address)), &self.opts)
            .await
        {
            Ok(state) => state,
            Err(e) => {
                warn!("Market data for {} unavailable: {}", address, e);
                return AnalysisResult::from_fetch_error(Analyzer::Market, &e);
            }
        };

        let (Some(reserves), Some(circulating_supply)) = (
            whole_reserves(&state.reserves, self.sol_decimals, self.token_decimals),
            to_whole(state.supply, self.token_decimals),
        ) else {
            warn!(
                "Cannot scale {} amounts by {}/{} decimals",
                address, self.sol_decimals, self.token_decimals
            );
            return AnalysisResult::degraded(Analyzer::Market, "unsupported unit decimals");
        };

        let Some((price, price_derived)) = resolve_price(state.price, &reserves) else {
            warn!("No price for {}: no quote and empty virtual token reserves", address);
            return AnalysisResult::degraded(Analyzer::Market, "price unavailable");
        };

        let trades_req = self
            .request(format!("{}/{}", self.trades_url, address))
            .query("limit", self.window)
            .query("offset", 0);
        let trades: Vec<Trade> = match self.client.fetch_json(&trades_req, &self.opts).await {
            Ok(trades) => trades,
            Err(e) => {
                warn!("Trade history for {} unavailable: {}", address, e);
                return match e {
                    FetchError::RateLimited { .. } => {
                        AnalysisResult::degraded(Analyzer::Market, "rate limited")
                    }
                    other => AnalysisResult::degraded(
                        Analyzer::Market,
                        format!("trade history unavailable: {other}"),
                    ),
                };
            }
        };

        let Some(market_cap) = price.checked_mul(circulating_supply) else {
            warn!("Market cap overflow for {}: {} x {}", address, price, circulating_supply);
            return AnalysisResult::degraded(Analyzer::Market, "market cap out of range");
        };
        let usd_market_cap = self
            .sol_usd()
            .await
            .and_then(|usd| market_cap.checked_mul(usd))
            .or(state.usd_market_cap);

        info!(
            "📈 {}: price {} SOL ({}), market cap {} SOL, {} trades",
            address,
            price,
            if price_derived { "derived" } else { "quoted" },
            market_cap,
            trades.len().min(self.window)
        );

        let snapshot = MarketSnapshot {
            price,
            price_derived,
            circulating_supply,
            market_cap,
            usd_market_cap,
            reserves,
            trades: TradeHistory::new(trades, self.window),
        };
        AnalysisResult::ok(Analyzer::Market, Finding::Market(snapshot), Vec::new())
    }

    /// Best effort; without a SOL price the platform's own USD figure is used.
    async fn sol_usd(&self) -> Option<Decimal> {
        match self
            .client
            .fetch_json::<SolPrice>(&self.request(self.sol_price_url.clone()), &self.opts)
            .await
        {
            Ok(p) => Some(p.sol_price),
            Err(e) => {
                debug!("SOL price unavailable: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Status;
    use crate::tests::support::{client, config, serve};
    use axum::{extract::Query, http::StatusCode, routing::get, Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    fn reserves(vsol: i64, vtoken: i64) -> Reserves {
        Reserves {
            virtual_sol: Decimal::from(vsol),
            virtual_token: Decimal::from(vtoken),
            ..Reserves::default()
        }
    }

    #[test]
    fn quoted_price_beats_derivation() {
        let quoted = Decimal::new(1, 3);
        assert_eq!(resolve_price(Some(quoted), &reserves(30, 1000)), Some((quoted, false)));
    }

    #[test]
    fn derives_price_from_reserve_ratio() {
        assert_eq!(
            resolve_price(None, &reserves(30, 1000)),
            Some((Decimal::new(3, 2), true))
        );
    }

    #[test]
    fn no_price_without_token_reserves() {
        assert_eq!(resolve_price(None, &reserves(30, 0)), None);
        assert_eq!(resolve_price(Some(Decimal::ZERO), &reserves(30, 0)), None);
    }

    #[test]
    fn rejects_non_mint_addresses() {
        assert!(is_mint_address("7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr"));
        assert!(!is_mint_address(""));
        assert!(!is_mint_address("../etc"));
    }

    fn platform() -> Router {
        coin_and_price().route(
            "/trades/:mint",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                assert_eq!(q.get("limit").map(String::as_str), Some("5"));
                let trades: Vec<_> = (0..8)
                    .map(|i| {
                        json!({
                            "signature": format!("sig{i}"),
                            "mint": "ABC",
                            "sol_amount": 1,
                            "token_amount": 100,
                            "is_buy": i % 2 == 0,
                            "user": "u",
                            "timestamp": 1_700_000_000 + i
                        })
                    })
                    .collect();
                Json(trades)
            }),
        )
    }

    fn coin_and_price() -> Router {
        Router::new()
            .route(
                "/coins/:mint",
                get(|| async {
                    Json(json!({
                        "mint": "ABC",
                        "total_supply": 1000,
                        "price": 0.001,
                        "virtual_sol_reserves": 30,
                        "virtual_token_reserves": 1000,
                        "real_sol_reserves": 2,
                        "real_token_reserves": 700
                    }))
                }),
            )
            .route("/sol-price", get(|| async { Json(json!({ "solPrice": 150 })) }))
    }

    #[tokio::test]
    async fn computes_market_cap_and_bounded_history() {
        let base = serve(platform()).await;
        let cfg = config(&base);
        let fetcher = MarketDataFetcher::new(client(&cfg), &cfg);

        let result = fetcher.fetch("ABC").await;
        assert_eq!(result.status(), Status::Ok);
        let Some(Finding::Market(snapshot)) = result.into_finding() else {
            panic!("expected market finding");
        };
        assert_eq!(snapshot.market_cap, Decimal::ONE);
        assert!(!snapshot.price_derived);
        assert_eq!(snapshot.usd_market_cap, Some(Decimal::from(150)));

        let sigs: Vec<String> = snapshot.trades.map(|t| t.signature).collect();
        assert_eq!(sigs, vec!["sig7", "sig6", "sig5", "sig4", "sig3"]);
    }

    #[tokio::test]
    async fn missing_sol_price_keeps_status_ok() {
        let app = Router::new()
            .route(
                "/coins/:mint",
                get(|| async {
                    Json(json!({
                        "mint": "ABC",
                        "total_supply": 1000,
                        "virtual_sol_reserves": 30,
                        "virtual_token_reserves": 1000
                    }))
                }),
            )
            .route("/trades/:mint", get(|| async { Json(json!([])) }));
        let base = serve(app).await;
        let cfg = config(&base);
        let fetcher = MarketDataFetcher::new(client(&cfg), &cfg);

        let result = fetcher.fetch("ABC").await;
        assert_eq!(result.status(), Status::Ok);
        let Some(Finding::Market(snapshot)) = result.into_finding() else {
            panic!("expected market finding");
        };
        assert!(snapshot.price_derived);
        assert_eq!(snapshot.market_cap, Decimal::from(30));
        assert_eq!(snapshot.usd_market_cap, None);
        assert_eq!(snapshot.trades.len(), 0);
    }

    #[tokio::test]
    async fn raw_platform_units_are_scaled_to_whole_sol_and_tokens() {
        let app = Router::new()
            .route(
                "/coins/:mint",
                get(|| async {
                    Json(json!({
                        "mint": "7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr",
                        "total_supply": 1_000_000_000_000_000u64,
                        "virtual_sol_reserves": 30_000_000_000u64,
                        "virtual_token_reserves": 1_073_000_000_000_000u64,
                        "real_sol_reserves": 0,
                        "real_token_reserves": 793_100_000_000_000u64,
                        "market_cap": 27.959,
                        "usd_market_cap": 4193.85
                    }))
                }),
            )
            .route("/trades/:mint", get(|| async { Json(json!([])) }));
        let base = serve(app).await;
        let mut cfg = config(&base);
        cfg.sol_decimals = 9;
        cfg.token_decimals = 6;
        let fetcher = MarketDataFetcher::new(client(&cfg), &cfg);

        let result = fetcher.fetch("7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr").await;
        assert_eq!(result.status(), Status::Ok);
        let Some(Finding::Market(snapshot)) = result.into_finding() else {
            panic!("expected market finding");
        };
        assert!(snapshot.price_derived);
        assert_eq!(snapshot.circulating_supply, Decimal::from(1_000_000_000u64));
        assert_eq!(snapshot.reserves.virtual_sol, Decimal::from(30));
        assert_eq!(snapshot.market_cap.round_dp(2), Decimal::new(2796, 2));
        // No SOL price route: the platform's own USD figure stands in.
        assert_eq!(snapshot.usd_market_cap, Some(Decimal::new(419385, 2)));
    }

    #[test]
    fn whole_units_reject_absurd_decimals() {
        assert_eq!(to_whole(Decimal::from(5_000_000_000u64), 9), Some(Decimal::from(5)));
        assert_eq!(to_whole(Decimal::ONE, 30), None);
    }

    #[tokio::test]
    async fn coin_lookup_failure_is_unavailable() {
        let app = Router::new().route("/coins/:mint", get(|| async { StatusCode::NOT_FOUND }));
        let base = serve(app).await;
        let cfg = config(&base);
        let fetcher = MarketDataFetcher::new(client(&cfg), &cfg);

        let result = fetcher.fetch("ABC").await;
        assert_eq!(result.status(), Status::Unavailable);
        assert!(result.finding().is_none());
    }

    #[tokio::test]
    async fn trade_failure_degrades() {
        let app = coin_and_price().route("/trades/:mint", get(|| async { StatusCode::BAD_GATEWAY }));
        let base = serve(app).await;
        let cfg = config(&base);
        let fetcher = MarketDataFetcher::new(client(&cfg), &cfg);

        let result = fetcher.fetch("ABC").await;
        assert_eq!(result.status(), Status::Degraded);
        assert!(result.reason().unwrap().starts_with("trade history unavailable"));
    }

    #[tokio::test]
    async fn latest_token_reads_feed() {
        let app = Router::new().route(
            "/latest",
            get(|| async {
                Json(json!({
                    "mint": "XYZ",
                    "name": "Zed",
                    "symbol": "ZED",
                    "website": "https://zed.example",
                    "twitter": "@zed",
                    "total_supply": 1000
                }))
            }),
        );
        let base = serve(app).await;
        let cfg = config(&base);
        let fetcher = MarketDataFetcher::new(client(&cfg), &cfg);

        let token = fetcher.latest_token(&cfg.endpoints.latest_coin_url).await.unwrap();
        assert_eq!(token.address, "XYZ");
        assert_eq!(token.symbol, "ZED");
        assert_eq!(token.social_handle.as_deref(), Some("@zed"));
    }
}
