//! Derived market-condition classification over a sliding price window.
//!
//! Recomputes are rate-limited and trailing-edge coalesced so a burst of
//! price events produces one condition change, not a flickering sequence.

use serde::Serialize;

use crate::config::Config;
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::snapshot::Candle;

/// Candles considered by the classifier.
const WINDOW: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    Calm,
    Bullish,
    Bearish,
    Volatile,
    Crash,
    Building,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::Calm => "calm",
            Condition::Bullish => "bullish",
            Condition::Bearish => "bearish",
            Condition::Volatile => "volatile",
            Condition::Crash => "crash",
            Condition::Building => "building",
        }
    }
}

/// Classify the market from the last [`WINDOW`] candles.
///
/// `current_price` stands in for the last close when the backend has pushed a
/// tick newer than the candle series; pass 0.0 (or less) when unset.
pub fn classify(history: &[Candle], current_price: f64) -> Condition {
    if history.len() < 2 {
        return Condition::Calm;
    }
    let window = &history[history.len().saturating_sub(WINDOW)..];

    let first_close = window[0].close;
    if first_close <= 0.0 {
        return Condition::Calm;
    }
    let last_price = if current_price > 0.0 {
        current_price
    } else {
        window[window.len() - 1].close
    };
    let percent_change = (last_price - first_close) / first_close * 100.0;

    // Mean absolute close-to-close move, as a percentage.
    let mut moves = 0.0;
    let mut samples = 0u32;
    for pair in window.windows(2) {
        let prev = pair[0].close;
        if prev > 0.0 {
            moves += ((pair[1].close - prev) / prev).abs() * 100.0;
            samples += 1;
        }
    }
    let volatility = if samples > 0 { moves / samples as f64 } else { 0.0 };

    if volatility > 4.0 {
        if percent_change < -8.0 {
            Condition::Crash
        } else {
            // High volatility covers both large positive spikes and churn.
            Condition::Volatile
        }
    } else if percent_change > 5.0 {
        Condition::Bullish
    } else if percent_change < -3.0 {
        Condition::Bearish
    } else {
        Condition::Calm
    }
}

/// Rate-limited wrapper owning the published condition.
#[derive(Debug)]
pub struct SignalEngine {
    condition: Condition,
    last_run_ms: u64,
    pending_at: Option<u64>,
    recomputes: u64,
}

impl Default for SignalEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalEngine {
    pub fn new() -> Self {
        // Building until the first recompute lands.
        Self { condition: Condition::Building, last_run_ms: 0, pending_at: None, recomputes: 0 }
    }

    pub fn condition(&self) -> Condition {
        self.condition
    }

    pub fn recomputes(&self) -> u64 {
        self.recomputes
    }

    /// Ask for a recompute. The deadline lands no sooner than the trailing
    /// coalesce delay and no sooner than the minimum interval since the last
    /// run; repeat triggers collapse into the pending deadline.
    pub fn request(&mut self, now_ms: u64, cfg: &Config) {
        if self.pending_at.is_some() {
            return;
        }
        let earliest = self.last_run_ms.saturating_add(cfg.derived_signal_min_interval_ms);
        self.pending_at = Some(earliest.max(now_ms.saturating_add(cfg.signal_coalesce_ms)));
    }

    pub fn due(&self, now_ms: u64) -> bool {
        matches!(self.pending_at, Some(at) if now_ms >= at)
    }

    pub fn pending(&self) -> bool {
        self.pending_at.is_some()
    }

    /// Run the classifier now and publish the result.
    pub fn run(&mut self, history: &[Candle], current_price: f64, now_ms: u64) {
        self.pending_at = None;
        self.last_run_ms = now_ms;
        self.recomputes += 1;

        let next = classify(history, current_price);
        if next != self.condition {
            log(
                Level::Info,
                Domain::Signal,
                "condition_change",
                obj(&[("from", v_str(self.condition.as_str())), ("to", v_str(next.as_str()))]),
            );
            self.condition = next;
        }
    }

    /// Hard reset: back to Building, cancel any pending recompute.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
