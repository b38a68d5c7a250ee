//! Historical backtesting.
//!
//! Replays the dual-momentum signal over month-end closes and reports
//! CAGR, annualized volatility, Sharpe (rf = 0), maximum drawdown and
//! the final value of 1 unit invested. Rebalancing is monthly; turnover
//! is charged a proportional transaction cost.

use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;
use std::fmt;

use crate::types::{BotError, PricePoint};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Month-end closes for the three-asset universe, in candidate order:
/// `[risky_a, risky_b, safe]`.
#[derive(Debug, Clone, Copy)]
pub struct MonthlyClose {
    pub month: NaiveDate,
    pub closes: [f64; 3],
}

#[derive(Debug, Clone)]
pub struct BacktestConfig {
    /// Momentum lookback in months.
    pub lookback_months: usize,
    /// Cost per unit of turnover (0.001 = 10 bp per full rotation leg).
    pub transaction_cost: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            lookback_months: 6,
            transaction_cost: 0.001,
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BacktestReport {
    /// Simulated months (after the lookback warm-up).
    pub months: usize,
    /// Months on which the portfolio rotated into a different asset.
    pub rebalances: usize,
    pub cagr: f64,
    pub annual_vol: f64,
    pub sharpe: f64,
    /// Worst peak-to-trough loss, as a negative fraction.
    pub max_drawdown: f64,
    /// Growth of 1 unit over the simulation.
    pub final_value: f64,
    pub equity_curve: Vec<(NaiveDate, f64)>,
}

impl fmt::Display for BacktestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "months:        {}", self.months)?;
        writeln!(f, "rebalances:    {}", self.rebalances)?;
        writeln!(f, "CAGR:          {:.2}%", self.cagr * 100.0)?;
        writeln!(f, "annual vol:    {:.2}%", self.annual_vol * 100.0)?;
        writeln!(f, "Sharpe:        {:.2}", self.sharpe)?;
        writeln!(f, "max drawdown:  {:.2}%", self.max_drawdown * 100.0)?;
        write!(f, "final value:   {:.4}", self.final_value)
    }
}

// ---------------------------------------------------------------------------
// Backtester
// ---------------------------------------------------------------------------

pub struct Backtester {
    cfg: BacktestConfig,
}

impl Backtester {
    pub fn new(cfg: BacktestConfig) -> Self {
        Self { cfg }
    }

    /// Run the replay over chronological month-end closes.
    ///
    /// Requires `lookback_months + 2` months of data: one lookback window
    /// to form the first signal plus one forward month to realize it.
    pub fn run(&self, series: &[MonthlyClose]) -> Result<BacktestReport, BotError> {
        let lookback = self.cfg.lookback_months;
        let needed = lookback + 2;
        if series.len() < needed {
            return Err(BotError::InsufficientHistory {
                needed,
                got: series.len(),
            });
        }

        // Target weights decided at each month end. The decision at month
        // t is realized over month t+1, so the signal only ever uses
        // closes that existed when the trade would have been placed.
        let weights: Vec<[f64; 3]> = (0..series.len())
            .map(|t| {
                if t < lookback {
                    [0.0; 3] // warm-up: in cash
                } else {
                    decide_weights(&series[t - lookback].closes, &series[t].closes)
                }
            })
            .collect();

        let mut equity = 1.0_f64;
        let mut peak = 1.0_f64;
        let mut max_dd = 0.0_f64;
        let mut returns = Vec::new();
        let mut rebalances = 0usize;
        let mut equity_curve = vec![(series[lookback].month, equity)];

        for t in (lookback + 1)..series.len() {
            let held = weights[t - 1];
            let gross: f64 = (0..3)
                .map(|i| held[i] * (series[t].closes[i] / series[t - 1].closes[i] - 1.0))
                .sum();

            // Cost of moving from the previous month's book into `held`.
            let prev = if t >= 2 { weights[t - 2] } else { [0.0; 3] };
            let turnover: f64 = (0..3).map(|i| (held[i] - prev[i]).abs()).sum();
            if turnover > 0.0 {
                rebalances += 1;
            }

            let net = gross - turnover * self.cfg.transaction_cost;
            returns.push(net);
            equity *= 1.0 + net;
            peak = peak.max(equity);
            max_dd = max_dd.min(equity / peak - 1.0);
            equity_curve.push((series[t].month, equity));
        }

        let months = returns.len();
        let years = months as f64 / 12.0;
        let cagr = if years > 0.0 {
            equity.powf(1.0 / years) - 1.0
        } else {
            0.0
        };
        let annual_vol = sample_std(&returns) * 12.0_f64.sqrt();
        let mean_monthly = returns.iter().sum::<f64>() / months as f64;
        let sharpe = if annual_vol > 0.0 {
            mean_monthly * 12.0 / annual_vol
        } else {
            0.0
        };

        Ok(BacktestReport {
            months,
            rebalances,
            cagr,
            annual_vol,
            sharpe,
            max_drawdown: max_dd,
            final_value: equity,
            equity_curve,
        })
    }
}

/// The dual-momentum weight vector for one month: all-in on the stronger
/// risky asset when its lookback return is positive, otherwise all-in on
/// the safe asset. Ties favor the first-listed risky asset, matching the
/// live selector.
fn decide_weights(base: &[f64; 3], latest: &[f64; 3]) -> [f64; 3] {
    let ret_a = latest[0] / base[0] - 1.0;
    let ret_b = latest[1] / base[1] - 1.0;
    let (best_idx, best_ret) = if ret_b > ret_a { (1, ret_b) } else { (0, ret_a) };

    let mut weights = [0.0; 3];
    if best_ret > 0.0 {
        weights[best_idx] = 1.0;
    } else {
        weights[2] = 1.0;
    }
    weights
}

fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    variance.sqrt()
}

// ---------------------------------------------------------------------------
// Series preparation
// ---------------------------------------------------------------------------

/// Keep the last close of each calendar month, in chronological order.
pub fn resample_month_end(daily: &[PricePoint]) -> Vec<PricePoint> {
    let mut by_month: BTreeMap<(i32, u32), PricePoint> = BTreeMap::new();
    for point in daily {
        by_month.insert((point.date.year(), point.date.month()), *point);
    }
    by_month.into_values().collect()
}

/// Align three month-end series on the months all of them cover.
pub fn align_monthly(series: [&[PricePoint]; 3]) -> Vec<MonthlyClose> {
    let maps: Vec<BTreeMap<(i32, u32), PricePoint>> = series
        .iter()
        .map(|s| {
            s.iter()
                .map(|p| ((p.date.year(), p.date.month()), *p))
                .collect()
        })
        .collect();

    maps[0]
        .iter()
        .filter_map(|(month, a)| {
            let b = maps[1].get(month)?;
            let c = maps[2].get(month)?;
            Some(MonthlyClose {
                month: a.date,
                closes: [a.close, b.close, c.close],
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
