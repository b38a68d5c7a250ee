//! Dual-momentum selection.
//!
//! Relative momentum picks the stronger of the two risky candidates;
//! absolute momentum demands its trailing return be positive, otherwise
//! the safe candidate is chosen. Pure functions, no I/O: the engine
//! feeds them gateway data and unit tests feed them literals.

use crate::types::{BotError, Candidate, ReturnSample};

/// Lookback return over `lookback` trading periods:
/// `(latest_close / close_lookback_ago) - 1`.
///
/// `closes` must be in chronological order. Fails with
/// `InsufficientHistory` when fewer than `lookback + 1` closes are
/// available. A hard precondition, never a silent zero.
pub fn trailing_return(closes: &[f64], lookback: usize) -> Result<f64, BotError> {
    let needed = lookback + 1;
    if closes.len() < needed {
        return Err(BotError::InsufficientHistory {
            needed,
            got: closes.len(),
        });
    }

    let latest = closes[closes.len() - 1];
    let base = closes[closes.len() - 1 - lookback];
    if base <= 0.0 || latest <= 0.0 {
        return Err(BotError::Malformed(format!(
            "non-positive close in history (base={base}, latest={latest})"
        )));
    }

    Ok(latest / base - 1.0)
}

/// Choose the segment's single target holding.
///
/// The best risky candidate is the one with the highest lookback return;
/// on exact equality the first-listed candidate wins (deterministic
/// tie-break: the comparison is strict, so an equal later entry never
/// displaces the incumbent). If the best risky return is not positive,
/// the safe candidate is chosen instead.
pub fn select_target(risky: &[ReturnSample], safe: Candidate) -> Candidate {
    let mut best: Option<ReturnSample> = None;
    for sample in risky {
        match best {
            Some(current) if sample.lookback_return > current.lookback_return => {
                best = Some(*sample);
            }
            None => best = Some(*sample),
            _ => {}
        }
    }

    match best {
        Some(sample) if sample.lookback_return > 0.0 => sample.candidate,
        _ => safe,
    }
}
