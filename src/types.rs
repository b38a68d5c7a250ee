//! Shared types for the ROTOR agent.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that broker, strategy,
//! and engine modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

// ---------------------------------------------------------------------------
// Segments & sides
// ---------------------------------------------------------------------------

/// An independent market with its own candidate set, currency and
/// trading-hours rule. The two segments share nothing at runtime except
/// the auth token cache and the notification sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Segment {
    Domestic,
    Overseas,
}

impl Segment {
    pub const ALL: &'static [Segment] = &[Segment::Domestic, Segment::Overseas];

    /// Settlement currency of this segment.
    pub fn currency(&self) -> &'static str {
        match self {
            Segment::Domestic => "KRW",
            Segment::Overseas => "USD",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Domestic => write!(f, "domestic"),
            Segment::Overseas => write!(f, "overseas"),
        }
    }
}

impl std::str::FromStr for Segment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "domestic" | "kr" => Ok(Segment::Domestic),
            "overseas" | "os" | "us" => Ok(Segment::Overseas),
            _ => Err(anyhow::anyhow!("Unknown segment: {s}")),
        }
    }
}

/// Order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

// ---------------------------------------------------------------------------
// Candidates
// ---------------------------------------------------------------------------

/// Role a candidate plays in the dual-momentum comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AssetRole {
    /// Compared against the other risky candidate for relative momentum.
    Risky,
    /// Fallback when no risky candidate has positive trailing return.
    Safe,
}

/// A member of a segment's fixed asset universe. Candidate sets never
/// change at runtime, so all fields are static data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Candidate {
    /// Ticker or issue code as the brokerage knows it ("069500", "TQQQ").
    pub code: &'static str,
    /// Human-readable name for logs and the dashboard.
    pub name: &'static str,
    /// Exchange code used for order routing. Explicit per candidate:
    /// the overseas safe asset trades on a different exchange than the
    /// risky overseas candidates.
    pub exchange: &'static str,
    pub role: AssetRole,
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.code)
    }
}

/// Trailing return observed for one candidate this cycle. Computed fresh
/// every cycle; never persisted.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ReturnSample {
    pub candidate: Candidate,
    /// `(latest_close / close_N_periods_ago) - 1`
    pub lookback_return: f64,
}

impl fmt::Display for ReturnSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {:+.1}%",
            self.candidate.name,
            self.lookback_return * 100.0
        )
    }
}

/// The single chosen holding for a segment, produced once per cycle.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TargetDecision {
    pub candidate: Candidate,
    pub segment: Segment,
    pub decided_at: DateTime<Utc>,
}

impl fmt::Display for TargetDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] target={}", self.segment, self.candidate)
    }
}

// ---------------------------------------------------------------------------
// Account & orders
// ---------------------------------------------------------------------------

/// A position as reported live by the account gateway. Re-fetched every
/// cycle; never cached, so the engine never acts on stale quantities.
#[derive(Debug, Clone, Serialize)]
pub struct Holding {
    pub symbol: String,
    pub quantity: u32,
    /// Valuation in the segment currency, as reported by the brokerage.
    pub market_value: f64,
}

impl fmt::Display for Holding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x{} ({:.2})", self.symbol, self.quantity, self.market_value)
    }
}

/// An order the rotation engine submitted and the brokerage accepted.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutedOrder {
    pub symbol: String,
    pub side: Side,
    pub quantity: u32,
    pub price: f64,
}

impl fmt::Display for ExecutedOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} x{} @ {:.2}",
            self.side, self.symbol, self.quantity, self.price
        )
    }
}

/// One daily close from the price-history endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PricePoint {
    pub date: chrono::NaiveDate,
    pub close: f64,
}

/// Summary of one full reconcile cycle, used for logging.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub segment: Segment,
    pub target: TargetDecision,
    pub returns: Vec<ReturnSample>,
    pub orders: Vec<ExecutedOrder>,
    pub failed_orders: usize,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rets: Vec<String> = self.returns.iter().map(|r| r.to_string()).collect();
        write!(
            f,
            "[{}] target={} returns=[{}] orders={} failed={}",
            self.segment,
            self.target.candidate,
            rets.join(", "),
            self.orders.len(),
            self.failed_orders,
        )
    }
}

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Domain errors. Nothing here is fatal to the process: the scheduler
/// loops catch everything, log it, and retry on the next cycle.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    /// Token issuance failed: abort the cycle, retry next cycle.
    #[error("token issuance failed: {0}")]
    Auth(String),

    /// Price history could not be fetched; abort this cycle's decision.
    #[error("price history unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    /// Too few closes to cover the lookback window. A hard precondition:
    /// the selector never decides on partial data.
    #[error("insufficient history: need {needed} closes, have {got}")]
    InsufficientHistory { needed: usize, got: usize },

    /// Live quote could not be fetched.
    #[error("quote unavailable for {symbol}: {reason}")]
    QuoteUnavailable { symbol: String, reason: String },

    /// The brokerage refused an order. Carries the broker's message;
    /// the reconcile logs it and continues with the remaining steps.
    #[error("order rejected: {message}")]
    OrderRejected { message: String },

    /// Transport-level failure; caught at the loop boundary and followed
    /// by a short recovery sleep.
    #[error("broker transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The brokerage answered with a shape we could not interpret.
    #[error("unexpected broker response: {0}")]
    Malformed(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_display_and_parse() {
        assert_eq!(format!("{}", Segment::Domestic), "domestic");
        assert_eq!(format!("{}", Segment::Overseas), "overseas");
        assert_eq!("domestic".parse::<Segment>().unwrap(), Segment::Domestic);
        assert_eq!("US".parse::<Segment>().unwrap(), Segment::Overseas);
        assert!("lunar".parse::<Segment>().is_err());
    }

    #[test]
    fn test_segment_currency() {
        assert_eq!(Segment::Domestic.currency(), "KRW");
        assert_eq!(Segment::Overseas.currency(), "USD");
    }

    #[test]
    fn test_side_display() {
        assert_eq!(format!("{}", Side::Buy), "BUY");
        assert_eq!(format!("{}", Side::Sell), "SELL");
    }

    #[test]
    fn test_return_sample_display() {
        let sample = ReturnSample {
            candidate: Candidate {
                code: "TQQQ",
                name: "TQQQ",
                exchange: "NASD",
                role: AssetRole::Risky,
            },
            lookback_return: 0.123,
        };
        assert_eq!(format!("{sample}"), "TQQQ: +12.3%");
    }

    #[test]
    fn test_executed_order_display() {
        let order = ExecutedOrder {
            symbol: "069500".to_string(),
            side: Side::Sell,
            quantity: 10,
            price: 35000.0,
        };
        let display = format!("{order}");
        assert!(display.contains("SELL"));
        assert!(display.contains("069500"));
        assert!(display.contains("x10"));
    }

    #[test]
    fn test_error_display() {
        let e = BotError::InsufficientHistory { needed: 127, got: 90 };
        assert_eq!(format!("{e}"), "insufficient history: need 127 closes, have 90");

        let e = BotError::OrderRejected {
            message: "초당 거래건수를 초과하였습니다.".to_string(),
        };
        assert!(format!("{e}").starts_with("order rejected:"));
    }

    #[test]
    fn test_target_decision_serializes() {
        let decision = TargetDecision {
            candidate: Candidate {
                code: "069660",
                name: "KODEX 국고채3년",
                exchange: "KRX",
                role: AssetRole::Safe,
            },
            segment: Segment::Domestic,
            decided_at: Utc::now(),
        };
        let json = serde_json::to_string(&decision).unwrap();
        assert!(json.contains("069660"));
        assert!(json.contains("\"domestic\""));
    }
}
