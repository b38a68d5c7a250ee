//! Replay the rotation signal over historical prices.
//!
//! Fetches daily closes for a segment's universe through the brokerage
//! quotes API, resamples to month-end, and prints the performance report.
//!
//! Usage: `backtest [domestic|overseas] [lookback_months]`

use anyhow::{Context, Result};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use rotor::backtest::{align_monthly, resample_month_end, BacktestConfig, Backtester};
use rotor::broker::auth::TokenCache;
use rotor::broker::kis::KisClient;
use rotor::config::AppConfig;
use rotor::types::Segment;
use rotor::universe;

/// History span requested from the brokerage. The period endpoints cap
/// the row count per call, so this is a best-effort window, not 10 years.
const HISTORY_DAYS: i64 = 3650;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv::dotenv();
    let cfg = AppConfig::load("config.toml")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("rotor=info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let segment: Segment = match args.next() {
        Some(s) => s.parse()?,
        None => Segment::Overseas,
    };
    let lookback_months: usize = match args.next() {
        Some(n) => n.parse().context("lookback_months must be an integer")?,
        None => 6,
    };

    let app_key = AppConfig::resolve_env(&cfg.broker.app_key_env)?;
    let app_secret = AppConfig::resolve_secret(&cfg.broker.app_secret_env)?;

    let http = Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")?;

    let token = Arc::new(TokenCache::new(
        http.clone(),
        cfg.broker.base_url.trim_end_matches('/').to_string(),
        app_key.clone(),
        app_secret.clone(),
    ));
    let broker = KisClient::new(http, &cfg.broker, app_key, app_secret, token);

    let candidates = universe::candidates(segment);
    println!(
        "Backtesting {segment}: {} / {} vs safe {}  (lookback {lookback_months}m)",
        candidates[0].name, candidates[1].name, candidates[2].name,
    );

    let mut monthly = Vec::with_capacity(3);
    for candidate in candidates {
        let daily = broker
            .daily_series(candidate, HISTORY_DAYS)
            .await
            .with_context(|| format!("fetching history for {}", candidate.code))?;
        println!("  {}: {} daily closes", candidate.code, daily.len());
        monthly.push(resample_month_end(&daily));
    }

    let series = align_monthly([&monthly[0], &monthly[1], &monthly[2]]);
    let report = Backtester::new(BacktestConfig {
        lookback_months,
        transaction_cost: 0.001,
    })
    .run(&series)?;

    println!("\n{report}");
    Ok(())
}
