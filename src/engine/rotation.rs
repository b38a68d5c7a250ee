//! Rotation engine.
//!
//! One cycle: compute trailing returns for the segment's risky pair,
//! select the target, then reconcile live holdings against it by
//! liquidating everything that is not the target and acquiring the
//! target if it is not already held. Order failures are best-effort: logged,
//! counted, and re-evaluated from live holdings on the next cycle, which
//! makes the engine self-healing without a transaction log.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::broker::{AccountGateway, MarketData, OrderGateway};
use crate::notify::Notifier;
use crate::state::SegmentState;
use crate::strategy::momentum;
use crate::types::{
    BotError, Candidate, CycleReport, ExecutedOrder, Holding, ReturnSample, Segment, Side,
    TargetDecision,
};
use crate::universe;

/// The three gateway handles a segment engine drives. `KisClient`
/// implements all three; tests substitute in-memory fakes.
#[derive(Clone)]
pub struct Gateways {
    pub market: Arc<dyn MarketData>,
    pub account: Arc<dyn AccountGateway>,
    pub orders: Arc<dyn OrderGateway>,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Momentum lookback in trading days.
    pub lookback_days: usize,
    /// Cap on a single buy in the segment currency; `None` spends the
    /// full available cash.
    pub buy_cap: Option<f64>,
    /// Pause between consecutive order submissions (API rate limit).
    pub order_delay: Duration,
}

pub struct RotationEngine {
    segment: Segment,
    gateways: Gateways,
    state: Arc<SegmentState>,
    notifier: Notifier,
    cfg: EngineConfig,
}

impl RotationEngine {
    pub fn new(
        segment: Segment,
        gateways: Gateways,
        state: Arc<SegmentState>,
        notifier: Notifier,
        cfg: EngineConfig,
    ) -> Self {
        Self {
            segment,
            gateways,
            state,
            notifier,
            cfg,
        }
    }

    pub fn segment(&self) -> Segment {
        self.segment
    }

    /// Log to the tracing feed, the segment's bounded log, and Discord.
    async fn emit(&self, msg: &str) {
        info!(segment = %self.segment, "{msg}");
        self.state.push_log(msg).await;
        self.notifier.send(self.segment, msg).await;
    }

    /// One full decision + reconcile pass.
    ///
    /// Data errors (`Auth`, `DataUnavailable`, `InsufficientHistory`,
    /// `Transport`) abort the cycle before any order is placed; the
    /// engine never acts on partial data. Order-level failures inside
    /// the reconcile never surface here.
    pub async fn run_cycle(&self) -> Result<CycleReport, BotError> {
        self.state.touch().await;

        // 1. Trailing returns for the risky pair. Both must be available.
        let mut samples = Vec::new();
        for candidate in universe::risky(self.segment) {
            let ret = self
                .gateways
                .market
                .trailing_return(&candidate, self.cfg.lookback_days)
                .await?;
            samples.push(ReturnSample {
                candidate,
                lookback_return: ret,
            });
        }

        // 2. Select the single target for this cycle.
        let chosen = momentum::select_target(&samples, universe::safe(self.segment));
        let target = TargetDecision {
            candidate: chosen,
            segment: self.segment,
            decided_at: Utc::now(),
        };
        self.state.set_target(target).await;

        let summary: Vec<String> = samples.iter().map(|s| s.to_string()).collect();
        self.emit(&format!(
            "Target selected: {} ({})",
            chosen,
            summary.join(", ")
        ))
        .await;

        // 3. Live account state, re-fetched every cycle.
        let holdings = self.gateways.account.holdings(self.segment).await?;
        let cash = self.gateways.account.cash_balance(self.segment).await?;

        // 4. Reconcile holdings toward the target.
        let (orders, failed_orders) = self.reconcile(&chosen, &holdings, cash).await;

        Ok(CycleReport {
            segment: self.segment,
            target,
            returns: samples,
            orders,
            failed_orders,
        })
    }

    /// Adjust holdings toward `target`: sell every non-target position in
    /// full, then buy the target if absent. Each order is attempted
    /// independently; a failure is logged and the pass continues. Returns
    /// the accepted orders and the number of failures.
    pub async fn reconcile(
        &self,
        target: &Candidate,
        holdings: &[Holding],
        cash: f64,
    ) -> (Vec<ExecutedOrder>, usize) {
        let mut executed = Vec::new();
        let mut failed = 0usize;

        // -- Liquidate phase --------------------------------------------
        for holding in holdings {
            if holding.symbol == target.code || holding.quantity == 0 {
                continue;
            }
            self.emit(&format!(
                "Rotating out: selling {} x{}",
                holding.symbol, holding.quantity
            ))
            .await;

            match self.sell_full(holding).await {
                Ok(order) => executed.push(order),
                Err(e) => {
                    failed += 1;
                    let msg = format!("Sell failed for {}: {e}", holding.symbol);
                    warn!(segment = %self.segment, "{msg}");
                    self.state.push_log(&msg).await;
                    self.notifier.send(self.segment, &msg).await;
                }
            }
            // Rate-limit gap between consecutive submissions.
            tokio::time::sleep(self.cfg.order_delay).await;
        }

        // -- Acquire phase ----------------------------------------------
        let already_held = holdings
            .iter()
            .any(|h| h.symbol == target.code && h.quantity > 0);

        if already_held {
            self.emit(&format!("Holding {target} already, nothing to do"))
                .await;
            return (executed, failed);
        }

        match self.buy_target(target, cash).await {
            Ok(Some(order)) => executed.push(order),
            Ok(None) => {} // cannot-buy outcome, already logged
            Err(e) => {
                failed += 1;
                let msg = format!("Buy failed for {target}: {e}");
                warn!(segment = %self.segment, "{msg}");
                self.state.push_log(&msg).await;
                self.notifier.send(self.segment, &msg).await;
            }
        }

        (executed, failed)
    }

    /// Sell a position in full at its live quote.
    async fn sell_full(&self, holding: &Holding) -> Result<ExecutedOrder, BotError> {
        let candidate = universe::by_code(self.segment, &holding.symbol);
        let price = match candidate {
            Some(c) => self.gateways.market.current_price(&c).await?,
            // A stray position outside the universe: its reported
            // valuation gives the per-share limit price.
            None if holding.quantity > 0 => holding.market_value / holding.quantity as f64,
            None => 0.0,
        };

        self.gateways
            .orders
            .submit_order(
                self.segment,
                &holding.symbol,
                holding.quantity,
                price,
                Side::Sell,
            )
            .await?;

        Ok(ExecutedOrder {
            symbol: holding.symbol.to_string(),
            side: Side::Sell,
            quantity: holding.quantity,
            price,
        })
    }

    /// Buy the target with available cash, bounded by the configured cap.
    /// Returns `Ok(None)` for the valid cannot-buy outcome (cash too
    /// small for one share).
    async fn buy_target(
        &self,
        target: &Candidate,
        cash: f64,
    ) -> Result<Option<ExecutedOrder>, BotError> {
        let price = self.gateways.market.current_price(target).await?;
        if price <= 0.0 {
            return Err(BotError::QuoteUnavailable {
                symbol: target.code.to_string(),
                reason: format!("non-positive quote: {price}"),
            });
        }

        let budget = match self.cfg.buy_cap {
            Some(cap) => cash.min(cap),
            None => cash,
        };
        let quantity = (budget / price).floor() as i64;

        if quantity <= 0 {
            self.emit(&format!(
                "Cannot buy {target}: cash {budget:.2} {} below price {price:.2}",
                self.segment.currency()
            ))
            .await;
            return Ok(None);
        }
        let quantity = quantity as u32;

        self.emit(&format!(
            "Buying {target} x{quantity} at {price:.2} (cash {cash:.2} {})",
            self.segment.currency()
        ))
        .await;

        self.gateways
            .orders
            .submit_order(self.segment, target.code, quantity, price, Side::Buy)
            .await?;

        Ok(Some(ExecutedOrder {
            symbol: target.code.to_string(),
            side: Side::Buy,
            quantity,
            price,
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
