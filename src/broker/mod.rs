//! Brokerage integration.
//!
//! Defines the gateway traits the rotation engine consumes and provides
//! the KIS open-API implementation:
//! - `auth` — process-wide access-token cache with single-flight refresh
//! - `kis` — REST client for quotes, balances, holdings and orders
//!
//! The engine only ever sees the traits, so tests drive it with in-memory
//! fakes and never touch the network.

pub mod auth;
pub mod kis;

use async_trait::async_trait;

use crate::types::{BotError, Candidate, Holding, Segment, Side};

/// Trailing price data and live quotes for universe candidates.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Lookback return for a candidate: `(last_close / close_N_ago) - 1`
    /// over `lookback` trading days. Fails with `InsufficientHistory`
    /// when fewer than `lookback + 1` closes are available; the caller
    /// must abort the cycle's decision rather than act on partial data.
    async fn trailing_return(&self, candidate: &Candidate, lookback: usize)
        -> Result<f64, BotError>;

    /// Latest traded price for a candidate.
    async fn current_price(&self, candidate: &Candidate) -> Result<f64, BotError>;
}

/// Live account state for a market segment.
#[async_trait]
pub trait AccountGateway: Send + Sync {
    /// Current positions with quantity > 0. Always fetched fresh.
    async fn holdings(&self, segment: Segment) -> Result<Vec<Holding>, BotError>;

    /// Cash available for new orders, in the segment currency.
    async fn cash_balance(&self, segment: Segment) -> Result<f64, BotError>;
}

/// Order submission for a market segment.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Submit a limit order at `price`. A brokerage-side refusal surfaces
    /// as `OrderRejected` carrying the broker's message.
    async fn submit_order(
        &self,
        segment: Segment,
        symbol: &str,
        quantity: u32,
        price: f64,
        side: Side,
    ) -> Result<(), BotError>;
}
