//! Invariant predicates over the canonical state, checkable in one place.
//!
//! Pure functions returning an explicit violation; callers decide whether to
//! log, skip a frame, or fail a test on one.

use std::collections::HashSet;

use crate::config::Config;
use crate::snapshot::{Candle, MarketSnapshot, Trade};

#[derive(Debug, Clone)]
pub struct InvariantViolation {
    pub msg: String,
}

/// `price_history[i].time < price_history[i+1].time` for all valid `i`.
pub fn assert_history_ordering(history: &[Candle]) -> Result<(), InvariantViolation> {
    for (i, pair) in history.windows(2).enumerate() {
        if pair[0].time >= pair[1].time {
            return Err(InvariantViolation {
                msg: format!("history not strictly increasing at index {}", i),
            });
        }
    }
    Ok(())
}

/// No two trades share an id.
pub fn assert_unique_trade_ids(trades: &[Trade]) -> Result<(), InvariantViolation> {
    let mut seen = HashSet::with_capacity(trades.len());
    for t in trades {
        if !seen.insert(t.id.as_str()) {
            return Err(InvariantViolation { msg: format!("duplicate trade id {}", t.id) });
        }
    }
    Ok(())
}

/// Bounded collections stay within their caps.
pub fn assert_bounds(snapshot: &MarketSnapshot, cfg: &Config) -> Result<(), InvariantViolation> {
    if snapshot.recent_trades.len() > cfg.max_recent_trades.max(cfg.memory_high_water_mark) {
        return Err(InvariantViolation {
            msg: format!("recent_trades over bound: {}", snapshot.recent_trades.len()),
        });
    }
    if snapshot.price_history.len() > cfg.max_price_history {
        return Err(InvariantViolation {
            msg: format!("price_history over bound: {}", snapshot.price_history.len()),
        });
    }
    if snapshot.active_positions.len() > cfg.max_active_positions {
        return Err(InvariantViolation {
            msg: format!("active_positions over bound: {}", snapshot.active_positions.len()),
        });
    }
    Ok(())
}

/// All of the above; used after governor passes and in tests.
pub fn assert_snapshot(snapshot: &MarketSnapshot, cfg: &Config) -> Result<(), InvariantViolation> {
    assert_history_ordering(&snapshot.price_history)?;
    assert_unique_trade_ids(&snapshot.recent_trades)?;
    assert_bounds(snapshot, cfg)
}
