//! End-to-end simulation of the rotation engine against an in-memory
//! brokerage.
//!
//! The mock applies fills to its own book, so multi-cycle scenarios
//! exercise the engine's self-healing property: every cycle re-reads
//! live holdings and converges on the target without any persisted
//! transaction state.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rotor::broker::{AccountGateway, MarketData, OrderGateway};
use rotor::engine::rotation::{EngineConfig, Gateways, RotationEngine};
use rotor::notify::Notifier;
use rotor::state::SegmentState;
use rotor::types::{BotError, Candidate, Holding, Segment, Side};
use rotor::universe;

// ---------------------------------------------------------------------------
// Mock brokerage
// ---------------------------------------------------------------------------

/// A deterministic in-memory brokerage. All state is controllable from
/// test code; accepted orders settle instantly into the book.
struct MockBroker {
    inner: Mutex<MockBook>,
}

struct MockBook {
    returns: HashMap<&'static str, f64>,
    prices: HashMap<&'static str, f64>,
    holdings: HashMap<String, u32>,
    cash: f64,
    /// Symbols whose orders the "brokerage" rejects.
    rejecting: Vec<String>,
    orders: Vec<(String, u32, Side)>,
}

impl MockBroker {
    fn new(returns: &[(&'static str, f64)], prices: &[(&'static str, f64)], cash: f64) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(MockBook {
                returns: returns.iter().copied().collect(),
                prices: prices.iter().copied().collect(),
                holdings: HashMap::new(),
                cash,
                rejecting: Vec::new(),
                orders: Vec::new(),
            }),
        })
    }

    fn deposit_position(&self, symbol: &str, quantity: u32) {
        self.inner
            .lock()
            .unwrap()
            .holdings
            .insert(symbol.to_string(), quantity);
    }

    fn reject_orders_for(&self, symbol: &str) {
        self.inner.lock().unwrap().rejecting.push(symbol.to_string());
    }

    fn accept_all_orders(&self) {
        self.inner.lock().unwrap().rejecting.clear();
    }

    fn orders(&self) -> Vec<(String, u32, Side)> {
        self.inner.lock().unwrap().orders.clone()
    }

    fn position(&self, symbol: &str) -> u32 {
        self.inner
            .lock()
            .unwrap()
            .holdings
            .get(symbol)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl MarketData for MockBroker {
    async fn trailing_return(&self, candidate: &Candidate, _lookback: usize) -> Result<f64, BotError> {
        self.inner
            .lock()
            .unwrap()
            .returns
            .get(candidate.code)
            .copied()
            .ok_or(BotError::InsufficientHistory { needed: 127, got: 30 })
    }

    async fn current_price(&self, candidate: &Candidate) -> Result<f64, BotError> {
        self.inner
            .lock()
            .unwrap()
            .prices
            .get(candidate.code)
            .copied()
            .ok_or_else(|| BotError::QuoteUnavailable {
                symbol: candidate.code.to_string(),
                reason: "no mock quote".to_string(),
            })
    }
}

#[async_trait]
impl AccountGateway for MockBroker {
    async fn holdings(&self, _segment: Segment) -> Result<Vec<Holding>, BotError> {
        let book = self.inner.lock().unwrap();
        Ok(book
            .holdings
            .iter()
            .filter(|(_, &qty)| qty > 0)
            .map(|(symbol, &quantity)| Holding {
                symbol: symbol.clone(),
                quantity,
                market_value: book.prices.get(symbol.as_str()).copied().unwrap_or(0.0)
                    * quantity as f64,
            })
            .collect())
    }

    async fn cash_balance(&self, _segment: Segment) -> Result<f64, BotError> {
        Ok(self.inner.lock().unwrap().cash)
    }
}

#[async_trait]
impl OrderGateway for MockBroker {
    async fn submit_order(
        &self,
        _segment: Segment,
        symbol: &str,
        quantity: u32,
        price: f64,
        side: Side,
    ) -> Result<(), BotError> {
        let mut book = self.inner.lock().unwrap();
        if book.rejecting.iter().any(|s| s == symbol) {
            return Err(BotError::OrderRejected {
                message: format!("mock brokerage rejected {symbol}"),
            });
        }

        // Instant settlement into the book.
        match side {
            Side::Sell => {
                book.holdings.remove(symbol);
                book.cash += quantity as f64 * price;
            }
            Side::Buy => {
                *book.holdings.entry(symbol.to_string()).or_insert(0) += quantity;
                book.cash -= quantity as f64 * price;
            }
        }
        book.orders.push((symbol.to_string(), quantity, side));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

fn engine_for(broker: &Arc<MockBroker>) -> (RotationEngine, Arc<SegmentState>) {
    let state = Arc::new(SegmentState::new(Segment::Overseas));
    let engine = RotationEngine::new(
        Segment::Overseas,
        Gateways {
            market: broker.clone(),
            account: broker.clone(),
            orders: broker.clone(),
        },
        Arc::clone(&state),
        Notifier::disabled(),
        EngineConfig {
            lookback_days: 126,
            buy_cap: None,
            order_delay: Duration::ZERO,
        },
    );
    (engine, state)
}

const PRICES: &[(&str, f64)] = &[("TQQQ", 70.0), ("EFA", 80.0), ("GLD", 190.0)];

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rotation_converges_and_second_cycle_is_a_noop() {
    // Momentum favors TQQQ; the account holds the safe asset.
    let broker = MockBroker::new(&[("TQQQ", 0.12), ("EFA", 0.05)], PRICES, 1960.0);
    broker.deposit_position("GLD", 10);

    let (engine, _) = engine_for(&broker);

    let report = engine.run_cycle().await.unwrap();
    assert_eq!(report.target.candidate.code, "TQQQ");
    assert_eq!(report.failed_orders, 0);

    // Cash as read at cycle start funds the buy: floor(1960/70) = 28.
    // (Sell proceeds land after the cash query and are spent next cycle.)
    assert_eq!(broker.position("GLD"), 0);
    assert_eq!(broker.position("TQQQ"), 28);

    // Second cycle with an unchanged book issues no further orders.
    let orders_before = broker.orders().len();
    let report = engine.run_cycle().await.unwrap();
    assert_eq!(report.orders.len(), 0);
    assert_eq!(broker.orders().len(), orders_before);
}

#[tokio::test]
async fn failed_sell_is_retried_next_cycle() {
    let broker = MockBroker::new(&[("TQQQ", 0.08), ("EFA", 0.01)], PRICES, 700.0);
    broker.deposit_position("EFA", 5);
    broker.reject_orders_for("EFA");

    let (engine, state) = engine_for(&broker);

    // Cycle 1: the sell is rejected, the buy still goes through.
    let report = engine.run_cycle().await.unwrap();
    assert_eq!(report.failed_orders, 1);
    assert_eq!(broker.position("EFA"), 5);
    assert_eq!(broker.position("TQQQ"), 10); // floor(700/70)

    let snap = state.snapshot().await;
    assert!(snap.log.iter().any(|l| l.contains("Sell failed for EFA")));

    // Brokerage recovers; cycle 2 re-reads live holdings and completes
    // the liquidation without any persisted retry queue.
    broker.accept_all_orders();
    let report = engine.run_cycle().await.unwrap();
    assert_eq!(report.failed_orders, 0);
    assert_eq!(broker.position("EFA"), 0);
    assert!(report
        .orders
        .iter()
        .any(|o| o.symbol == "EFA" && o.side == Side::Sell));
}

#[tokio::test]
async fn negative_momentum_parks_in_safe_asset() {
    let broker = MockBroker::new(&[("TQQQ", -0.15), ("EFA", -0.02)], PRICES, 0.0);
    broker.deposit_position("TQQQ", 3);

    let (engine, _) = engine_for(&broker);
    let report = engine.run_cycle().await.unwrap();

    assert_eq!(report.target.candidate.code, "GLD");
    assert_eq!(broker.position("TQQQ"), 0);
    // Sale proceeds (3×70 = 210) buy one share of GLD at 190.
    assert_eq!(broker.position("GLD"), 0); // cash was read before the sale
    let snap_orders = broker.orders();
    assert_eq!(snap_orders.len(), 1);
    assert_eq!(snap_orders[0], ("TQQQ".to_string(), 3, Side::Sell));
}

#[tokio::test]
async fn sale_proceeds_fund_the_buy_on_the_following_cycle() {
    // Continuation of the scenario above: cash read at cycle start only,
    // so the proceeds of this cycle's sells are spent next cycle.
    let broker = MockBroker::new(&[("TQQQ", -0.15), ("EFA", -0.02)], PRICES, 0.0);
    broker.deposit_position("TQQQ", 3);

    let (engine, state) = engine_for(&broker);
    engine.run_cycle().await.unwrap();

    let snap = state.snapshot().await;
    assert!(snap.log.iter().any(|l| l.contains("Cannot buy")));

    engine.run_cycle().await.unwrap();
    assert_eq!(broker.position("GLD"), 1); // floor(210/190)
    assert!((broker.inner.lock().unwrap().cash - 20.0).abs() < 1e-9);
}

#[tokio::test]
async fn missing_history_aborts_cycle_without_orders() {
    // EFA has no return series at all.
    let broker = MockBroker::new(&[("TQQQ", 0.10)], PRICES, 1000.0);
    broker.deposit_position("GLD", 2);

    let (engine, _) = engine_for(&broker);
    let err = engine.run_cycle().await.unwrap_err();

    assert!(matches!(err, BotError::InsufficientHistory { .. }));
    assert!(broker.orders().is_empty());
    assert_eq!(broker.position("GLD"), 2);
}

#[tokio::test]
async fn stray_position_outside_the_universe_is_liquidated() {
    let broker = MockBroker::new(&[("TQQQ", 0.20), ("EFA", 0.10)], PRICES, 0.0);
    broker.deposit_position("AAPL", 7);

    let (engine, _) = engine_for(&broker);
    let report = engine.run_cycle().await.unwrap();

    assert_eq!(broker.position("AAPL"), 0);
    assert!(report
        .orders
        .iter()
        .any(|o| o.symbol == "AAPL" && o.side == Side::Sell));
}

#[tokio::test]
async fn target_is_published_to_segment_state() {
    let broker = MockBroker::new(&[("TQQQ", 0.02), ("EFA", 0.09)], PRICES, 0.0);
    let (engine, state) = engine_for(&broker);

    engine.run_cycle().await.unwrap();

    let snap = state.snapshot().await;
    let target = snap.target.expect("target published after a cycle");
    assert_eq!(target.candidate.code, "EFA");
    assert_eq!(target.segment, Segment::Overseas);
    assert!(snap.last_update.is_some());
    assert!(snap.log.iter().any(|l| l.contains("Target selected")));
}

#[tokio::test]
async fn tie_break_prefers_the_first_listed_candidate() {
    let broker = MockBroker::new(&[("TQQQ", 0.07), ("EFA", 0.07)], PRICES, 0.0);
    let (engine, _) = engine_for(&broker);

    let report = engine.run_cycle().await.unwrap();
    // TQQQ is listed first in the overseas universe.
    assert_eq!(universe::OVERSEAS[0].code, "TQQQ");
    assert_eq!(report.target.candidate.code, "TQQQ");
}
