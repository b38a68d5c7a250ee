//! Per-segment scheduler.
//!
//! Drives the rotation engine under market-hours gating:
//! Stopped → Running → Stopped, one loop per segment. `start` only ever
//! launches a loop from the stopped state, so there can never be two
//! concurrent order streams against the same account. Stop is
//! cooperative: long sleeps poll the run flag in short increments, so a
//! stop request lands within seconds rather than after the full
//! intraday sleep.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use super::rotation::RotationEngine;
use crate::hours;
use crate::notify::Notifier;
use crate::state::SegmentState;
use crate::types::Segment;

/// Increment at which sleeping loops re-check the run flag.
const STOP_POLL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Sleep after a completed cycle while the market is open.
    pub cycle_interval: Duration,
    /// Sleep between re-checks while the market is closed.
    pub closed_poll: Duration,
    /// Sleep after a failed cycle before retrying.
    pub recovery: Duration,
}

pub struct SegmentRunner {
    engine: RotationEngine,
    state: Arc<SegmentState>,
    notifier: Notifier,
    cfg: RunnerConfig,
}

impl SegmentRunner {
    pub fn new(
        engine: RotationEngine,
        state: Arc<SegmentState>,
        notifier: Notifier,
        cfg: RunnerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            engine,
            state,
            notifier,
            cfg,
        })
    }

    pub fn segment(&self) -> Segment {
        self.state.segment()
    }

    pub fn state(&self) -> Arc<SegmentState> {
        Arc::clone(&self.state)
    }

    /// Launch the trading loop. Returns false (and spawns nothing) if the
    /// segment is already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let Some(generation) = self.state.try_start() else {
            info!(segment = %self.segment(), "Start ignored, already running");
            return false;
        };

        let runner = Arc::clone(self);
        tokio::spawn(async move {
            runner.run_loop(generation).await;
        });
        true
    }

    /// Request cooperative shutdown. Returns false if the segment was not
    /// running.
    pub fn stop(&self) -> bool {
        if !self.state.is_running() {
            return false;
        }
        self.state.request_stop();
        true
    }

    async fn run_loop(&self, generation: u64) {
        let segment = self.segment();
        self.log("Trading loop started").await;

        while self.state.is_live(generation) {
            if !hours::is_open_now(segment) {
                self.log("Market closed, waiting").await;
                self.sleep_while_live(self.cfg.closed_poll, generation).await;
                continue;
            }

            match self.engine.run_cycle().await {
                Ok(report) => {
                    info!(segment = %segment, "Cycle complete: {report}");
                    self.sleep_while_live(self.cfg.cycle_interval, generation).await;
                }
                Err(e) => {
                    error!(segment = %segment, error = %e, "Cycle failed");
                    self.log(&format!("Cycle failed: {e}, retrying shortly"))
                        .await;
                    self.sleep_while_live(self.cfg.recovery, generation).await;
                }
            }
        }

        self.log("Trading loop stopped").await;
    }

    async fn log(&self, msg: &str) {
        info!(segment = %self.segment(), "{msg}");
        self.state.push_log(msg).await;
        self.notifier.send(self.segment(), msg).await;
    }

    /// Sleep up to `total`, returning early once this loop generation is
    /// no longer live.
    async fn sleep_while_live(&self, total: Duration, generation: u64) {
        let mut remaining = total;
        while !remaining.is_zero() && self.state.is_live(generation) {
            let step = remaining.min(STOP_POLL);
            tokio::time::sleep(step).await;
            remaining -= step;
        }
    }
}
