//! Canonical market state owned by the reconciler.

use serde::{Deserialize, Serialize};

/// Milliseconds since the epoch, the engine's logical clock unit.
pub type TimestampMs = u64;

/// One OHLCV bar. `time` is in seconds, matching the render contract.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: u64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

impl Candle {
    pub fn flat(time: u64, price: f64) -> Self {
        Self { time, open: price, high: price, low: price, close: price, volume: 0.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub price: f64,
    pub qty: f64,
    pub side: TradeSide,
    pub ts: TimestampMs,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub qty: f64,
}

/// Snapshot-semantics book: replaced wholesale, never patched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    #[serde(default)]
    pub last_update_ms: TimestampMs,
}

impl OrderBook {
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub trader_id: String,
    pub side: TradeSide,
    pub qty: f64,
    pub entry_price: f64,
    #[serde(default)]
    pub unrealized_pnl: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ranking {
    pub trader_id: String,
    pub pnl: f64,
    #[serde(default)]
    pub trade_count: u64,
    #[serde(default)]
    pub rank: u32,
}

/// The single authoritative in-memory market state.
///
/// Invariants (checked by [`crate::invariants`]):
/// - `price_history` strictly increasing in `time`
/// - `recent_trades` newest-first with unique ids
/// - bounded collections stay within their configured caps after a
///   governor pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub current_price: f64,
    pub order_book: OrderBook,
    pub price_history: Vec<Candle>,
    pub recent_trades: Vec<Trade>,
    pub active_positions: Vec<Position>,
    pub trader_rankings: Vec<Ranking>,
    pub total_trades_processed: u64,
}

impl MarketSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hard-reset clear. `current_price` survives until explicitly reseeded.
    pub fn clear_for_reset(&mut self) {
        self.order_book = OrderBook::default();
        self.price_history.clear();
        self.recent_trades.clear();
        self.active_positions.clear();
        self.trader_rankings.clear();
        self.total_trades_processed = 0;
    }
}

/// Running-simulation flags, owned separately from market data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationStatus {
    pub is_running: bool,
    pub is_paused: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<ScenarioStatus>,
}

/// Lifecycle of the currently loaded scenario, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioStatus {
    pub name: String,
    pub phase: String,
    #[serde(default)]
    pub phase_index: u32,
    pub active: bool,
}
