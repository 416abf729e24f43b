//! Memory governor: bounded collections via deferred, non-blocking trims.
//!
//! A trim never runs on the ingest path. The reconciler schedules a pass a
//! short delay out; the engine's tick fires it. Trimming only drops old
//! elements, it never reorders, so the snapshot's ordering invariants are
//! preserved by construction.

use crate::config::Config;
use crate::logging::{log, obj, v_u64, Domain, Level};
use crate::snapshot::MarketSnapshot;

#[derive(Debug, Default)]
pub struct MemoryGovernor {
    trim_at: Option<u64>,
    trims: u64,
    trades_dropped: u64,
    candles_dropped: u64,
    positions_dropped: u64,
}

impl MemoryGovernor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a pass. An already-pending earlier deadline wins (coalesce).
    pub fn schedule(&mut self, now_ms: u64, delay_ms: u64) {
        let at = now_ms.saturating_add(delay_ms);
        self.trim_at = Some(match self.trim_at {
            Some(existing) => existing.min(at),
            None => at,
        });
    }

    pub fn due(&self, now_ms: u64) -> bool {
        matches!(self.trim_at, Some(at) if now_ms >= at)
    }

    pub fn pending(&self) -> bool {
        self.trim_at.is_some()
    }

    /// Run the trim policy. Clears the pending deadline.
    pub fn run(&mut self, snapshot: &mut MarketSnapshot, cfg: &Config) {
        self.trim_at = None;

        let mut dropped_now = 0u64;

        // Trades: high-water mark triggers a truncate down to the retain
        // target, keeping the newest (head of the newest-first list).
        if snapshot.recent_trades.len() > cfg.memory_high_water_mark {
            let target = cfg.trim_target();
            dropped_now += (snapshot.recent_trades.len() - target) as u64;
            self.trades_dropped += (snapshot.recent_trades.len() - target) as u64;
            snapshot.recent_trades.truncate(target);
        }
        if snapshot.recent_trades.len() > cfg.max_recent_trades {
            let excess = snapshot.recent_trades.len() - cfg.max_recent_trades;
            self.trades_dropped += excess as u64;
            dropped_now += excess as u64;
            snapshot.recent_trades.truncate(cfg.max_recent_trades);
        }

        // Cascade: history is ascending, oldest at the front.
        if snapshot.price_history.len() > cfg.max_price_history {
            let excess = snapshot.price_history.len() - cfg.max_price_history;
            snapshot.price_history.drain(..excess);
            self.candles_dropped += excess as u64;
            dropped_now += excess as u64;
        }

        if snapshot.active_positions.len() > cfg.max_active_positions {
            let excess = snapshot.active_positions.len() - cfg.max_active_positions;
            snapshot.active_positions.drain(..excess);
            self.positions_dropped += excess as u64;
            dropped_now += excess as u64;
        }

        if dropped_now > 0 {
            self.trims += 1;
            log(
                Level::Debug,
                Domain::Memory,
                "trim",
                obj(&[
                    ("dropped", v_u64(dropped_now)),
                    ("trades", v_u64(snapshot.recent_trades.len() as u64)),
                    ("candles", v_u64(snapshot.price_history.len() as u64)),
                ]),
            );
        }
    }

    pub fn trims(&self) -> u64 {
        self.trims
    }

    /// Hard reset: counters and any pending deadline go back to zero.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
