//! ROTOR — dual-momentum ETF rotation agent.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! builds the shared broker session and the two segment runners
//! (domestic, overseas), serves the dashboard, and waits for Ctrl+C.
//! The trading loops themselves are started from the dashboard.

use anyhow::{Context, Result};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use rotor::broker::auth::TokenCache;
use rotor::broker::kis::KisClient;
use rotor::config::AppConfig;
use rotor::dashboard::{self, DashboardState};
use rotor::engine::rotation::{EngineConfig, Gateways, RotationEngine};
use rotor::engine::runner::{RunnerConfig, SegmentRunner};
use rotor::notify::Notifier;
use rotor::state::SegmentState;
use rotor::types::Segment;

const BANNER: &str = r#"
 ____   ___ _____ ___  ____
|  _ \ / _ \_   _/ _ \|  _ \
| |_) | | | || || | | | |_) |
|  _ <| |_| || || |_| |  _ <
|_| \_\\___/ |_| \___/|_| \_\

  Dual-Momentum Rotation Agent
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");
    info!(
        base_url = %cfg.broker.base_url,
        buy_cap_krw = cfg.trading.buy_cap_krw,
        lookback_days = cfg.trading.lookback_days,
        "ROTOR starting up"
    );

    // -- Shared resources ------------------------------------------------

    let app_key = AppConfig::resolve_env(&cfg.broker.app_key_env)?;
    let app_secret = AppConfig::resolve_secret(&cfg.broker.app_secret_env)?;

    let http = Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")?;

    // One token cache for the whole process, shared by both segments.
    let token = Arc::new(TokenCache::new(
        http.clone(),
        cfg.broker.base_url.trim_end_matches('/').to_string(),
        app_key.clone(),
        app_secret.clone(),
    ));

    let broker = Arc::new(KisClient::new(
        http,
        &cfg.broker,
        app_key,
        app_secret,
        token,
    ));

    let notifier = match &cfg.alerts.discord_webhook_env {
        Some(env) => Notifier::new(std::env::var(env).ok()),
        None => Notifier::disabled(),
    };

    // -- Segment runners -------------------------------------------------

    let runner_cfg = RunnerConfig {
        cycle_interval: Duration::from_secs(cfg.trading.cycle_interval_secs),
        closed_poll: Duration::from_secs(cfg.trading.closed_poll_secs),
        recovery: Duration::from_secs(cfg.trading.recovery_secs),
    };

    let build_runner = |segment: Segment, buy_cap: Option<f64>| {
        let state = Arc::new(SegmentState::new(segment));
        let engine = RotationEngine::new(
            segment,
            Gateways {
                market: broker.clone(),
                account: broker.clone(),
                orders: broker.clone(),
            },
            Arc::clone(&state),
            notifier.clone(),
            EngineConfig {
                lookback_days: cfg.trading.lookback_days,
                buy_cap,
                order_delay: Duration::from_secs(cfg.trading.order_delay_secs),
            },
        );
        SegmentRunner::new(engine, state, notifier.clone(), runner_cfg.clone())
    };

    let domestic = build_runner(Segment::Domestic, Some(cfg.trading.buy_cap_krw));
    let overseas = build_runner(Segment::Overseas, None);

    // -- Dashboard -------------------------------------------------------

    let dash_state = Arc::new(DashboardState {
        domestic: Arc::clone(&domestic),
        overseas: Arc::clone(&overseas),
    });

    if cfg.dashboard.enabled {
        dashboard::spawn_dashboard(dash_state, cfg.dashboard.port)?;
        info!(
            port = cfg.dashboard.port,
            "Dashboard up. Start the segments from the web UI. Press Ctrl+C to exit."
        );
    } else {
        // Headless: run both segments immediately.
        domestic.start();
        overseas.start();
        info!("Dashboard disabled. Both segments started. Press Ctrl+C to exit.");
    }

    // -- Shutdown --------------------------------------------------------

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutdown signal received.");
    domestic.stop();
    overseas.stop();

    // Give in-flight cycles a moment to observe the stop flag.
    tokio::time::sleep(Duration::from_secs(3)).await;
    info!("ROTOR shut down cleanly.");

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("rotor=info"));

    let json_logging = std::env::var("ROTOR_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
