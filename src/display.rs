// src/display.rs
use crate::models::{AnalysisResult, Finding, RiskReport, Status};
use std::fmt;

fn or_unknown(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => "unknown",
    }
}

impl fmt::Display for RiskReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = &self.token;
        writeln!(f, "{}", "=".repeat(50))?;
        writeln!(f, "Token Risk Report ({})", self.generated_at.to_rfc3339())?;
        writeln!(f, "{}", "=".repeat(50))?;
        writeln!(f, "Name: {}", or_unknown(Some(t.name.as_str())))?;
        writeln!(f, "Symbol: {}", or_unknown(Some(t.symbol.as_str())))?;
        writeln!(f, "Mint: {}", t.address)?;
        writeln!(f, "Creator: {}", or_unknown(t.creator.as_deref()))?;
        writeln!(f, "Website: {}", or_unknown(t.website.as_deref()))?;
        writeln!(f, "Twitter: {}", or_unknown(t.social_handle.as_deref()))?;
        writeln!(f, "Description: {}", or_unknown(t.description.as_deref()))?;
        writeln!(f, "Feed Supply (base units): {}", t.supply)?;
        writeln!(
            f,
            "Feed Reserves (base units): {} / {} virtual, {} / {} real (SOL / token)",
            t.reserves.virtual_sol, t.reserves.virtual_token, t.reserves.real_sol, t.reserves.real_token
        )?;
        if !t.recent_trades.is_empty() {
            writeln!(f, "Feed Trades: {}", t.recent_trades.len())?;
        }

        for result in &self.results {
            writeln!(f)?;
            write_result(f, result)?;
        }

        writeln!(f)?;
        if self.flags.is_empty() {
            writeln!(f, "Warning flags: none")?;
        } else {
            writeln!(f, "Warning flags:")?;
            for flag in &self.flags {
                writeln!(f, "  ⚠️ {} ({})", flag.flag, flag.origin)?;
            }
        }
        write!(f, "Overall risk: {}", self.level.to_string().to_uppercase())
    }
}

fn write_result(f: &mut fmt::Formatter<'_>, result: &AnalysisResult) -> fmt::Result {
    write!(f, "[{}] {}", result.analyzer(), result.status())?;
    if result.status() != Status::Ok {
        return writeln!(f, ": {}", result.reason().unwrap_or("unavailable"));
    }
    writeln!(f)?;

    match result.finding() {
        Some(Finding::AiContent { score }) => {
            writeln!(f, "  AI Content Score: {:.2}", score)?;
        }
        Some(Finding::Social(m)) => {
            writeln!(f, "  Handle: @{}", m.handle)?;
            match m.account_age_days {
                Some(days) => writeln!(f, "  Account Age: {} days", days)?,
                None => writeln!(f, "  Account Age: unknown")?,
            }
            writeln!(f, "  Followers: {}", m.followers)?;
            writeln!(f, "  Following: {}", m.following)?;
            writeln!(f, "  Follower/Following Ratio: {:.3}", m.follower_following_ratio)?;
            match m.tweet_count {
                Some(n) => writeln!(f, "  Total Tweets: {}", n)?,
                None => writeln!(f, "  Total Tweets: unknown")?,
            }
            if let Some(rate) = m.engagement_rate {
                writeln!(f, "  Tweets/Day: {:.2}", rate)?;
            }
            writeln!(f, "  Verified: {}", m.verified)?;
            if let Some(location) = &m.location {
                writeln!(f, "  Location: {}", location)?;
            }
        }
        Some(Finding::Market(s)) => {
            writeln!(
                f,
                "  Price: {} SOL{}",
                s.price,
                if s.price_derived { " (from reserves)" } else { "" }
            )?;
            writeln!(f, "  Supply: {}", s.circulating_supply)?;
            writeln!(f, "  Market Cap: {} SOL", s.market_cap)?;
            match s.usd_market_cap {
                Some(usd) => writeln!(f, "  Market Cap (USD): ${}", usd.round_dp(2))?,
                None => writeln!(f, "  Market Cap (USD): unavailable")?,
            }
            writeln!(
                f,
                "  Virtual Reserves: {} SOL / {} tokens",
                s.reserves.virtual_sol, s.reserves.virtual_token
            )?;
            writeln!(
                f,
                "  Real Reserves: {} SOL / {} tokens",
                s.reserves.real_sol, s.reserves.real_token
            )?;
            let trades = s.trades.remaining();
            if trades.is_empty() {
                writeln!(f, "  No recent trades available")?;
            }
            for trade in trades {
                writeln!(
                    f,
                    "  {} {} tokens for {} SOL by {} ({})",
                    if trade.is_buy { "BUY " } else { "SELL" },
                    trade.token_amount,
                    trade.sol_amount,
                    or_unknown(Some(trade.user.as_str())),
                    trade.signature
                )?;
            }
        }
        None => {}
    }
    Ok(())
}
