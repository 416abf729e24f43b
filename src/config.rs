//! Engine configuration: bounds, intervals and viewport tuning.
//!
//! Every knob has an environment override and a hard default, so the engine
//! can be tuned per deployment without a config file.

#[derive(Debug, Clone)]
pub struct Config {
    /// Cap on the canonical candle series.
    pub max_price_history: usize,
    /// Absolute cap on the recent-trades list.
    pub max_recent_trades: usize,
    /// Cap on tracked open positions.
    pub max_active_positions: usize,
    /// Trade count that triggers a deferred trim.
    pub memory_high_water_mark: usize,
    /// Fraction of the high-water mark kept after a trim (clamped 0.5..=0.9).
    pub memory_retain_fraction: f64,
    /// Delay before a scheduled trim fires, keeping it off the ingest path.
    pub trim_delay_ms: u64,
    pub min_visible_candles: usize,
    pub max_visible_candles: usize,
    pub preferred_visible_candles: usize,
    /// Minimum interval between chart redraws.
    pub redraw_throttle_ms: u64,
    /// Minimum interval between market-condition recomputes.
    pub derived_signal_min_interval_ms: u64,
    /// Trailing delay applied when coalescing condition recompute triggers.
    pub signal_coalesce_ms: u64,
    /// Synced frames after a reset before relaxed validation is forced off.
    pub grace_candle_budget: u32,
    /// Chance that a batch of new candles re-fits an auto-fit viewport.
    pub viewport_refit_probability: f64,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            max_price_history: env_parse("MAX_PRICE_HISTORY", 1000),
            max_recent_trades: env_parse("MAX_RECENT_TRADES", 1000),
            max_active_positions: env_parse("MAX_ACTIVE_POSITIONS", 200),
            memory_high_water_mark: env_parse("MEMORY_HIGH_WATER", 1000),
            memory_retain_fraction: env_parse("MEMORY_RETAIN_FRACTION", 0.8),
            trim_delay_ms: env_parse("TRIM_DELAY_MS", 50),
            min_visible_candles: env_parse("MIN_VISIBLE_CANDLES", 15),
            max_visible_candles: env_parse("MAX_VISIBLE_CANDLES", 40),
            preferred_visible_candles: env_parse("PREFERRED_VISIBLE_CANDLES", 25),
            redraw_throttle_ms: env_parse("REDRAW_THROTTLE_MS", 50),
            derived_signal_min_interval_ms: env_parse("SIGNAL_MIN_INTERVAL_MS", 2500),
            signal_coalesce_ms: env_parse("SIGNAL_COALESCE_MS", 250),
            grace_candle_budget: env_parse("GRACE_CANDLE_BUDGET", 5),
            viewport_refit_probability: env_parse("VIEWPORT_REFIT_PROB", 0.35),
        }
        .normalized()
    }

    /// Clamp fields into their supported ranges.
    pub fn normalized(mut self) -> Self {
        self.memory_retain_fraction = self.memory_retain_fraction.clamp(0.5, 0.9);
        self.viewport_refit_probability = self.viewport_refit_probability.clamp(0.0, 1.0);
        if self.min_visible_candles == 0 {
            self.min_visible_candles = 1;
        }
        if self.max_visible_candles < self.min_visible_candles {
            self.max_visible_candles = self.min_visible_candles;
        }
        self.preferred_visible_candles = self
            .preferred_visible_candles
            .clamp(self.min_visible_candles, self.max_visible_candles);
        self
    }

    /// Post-trim trade count target.
    pub fn trim_target(&self) -> usize {
        (self.memory_high_water_mark as f64 * self.memory_retain_fraction).floor() as usize
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_price_history: 1000,
            max_recent_trades: 1000,
            max_active_positions: 200,
            memory_high_water_mark: 1000,
            memory_retain_fraction: 0.8,
            trim_delay_ms: 50,
            min_visible_candles: 15,
            max_visible_candles: 40,
            preferred_visible_candles: 25,
            redraw_throttle_ms: 50,
            derived_signal_min_interval_ms: 2500,
            signal_coalesce_ms: 250,
            grace_candle_budget: 5,
            viewport_refit_probability: 0.35,
        }
    }
}
