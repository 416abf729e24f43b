//! Event envelopes and delta payloads pushed by the simulation backend.
//!
//! An envelope is transient: it is deserialized, admitted (or dropped) by the
//! dedup gate, merged by the reconciler, and discarded. Identity for dedup is
//! `(stream_id, kind, ts)`.

use serde::{Deserialize, Serialize};

use crate::snapshot::{Candle, OrderBook, Position, Ranking, TimestampMs, Trade};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SimulationState,
    PriceUpdate,
    Trade,
    ProcessedTrade,
    CandleUpdate,
    BatchUpdate,
    SimulationStatus,
    ScenarioStarted,
    ScenarioPhaseUpdate,
    ScenarioPhaseTransition,
    ScenarioEnded,
}

impl EventKind {
    /// Kinds whose payload replaces `recent_trades` wholesale.
    pub fn replaces_trades(&self) -> bool {
        matches!(self, EventKind::SimulationState | EventKind::PriceUpdate)
    }

    /// Kinds that carry a single incremental trade.
    pub fn is_single_trade(&self) -> bool {
        matches!(self, EventKind::Trade | EventKind::ProcessedTrade)
    }
}

/// Dedup identity of an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub stream_id: String,
    pub kind: EventKind,
    pub ts: TimestampMs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub stream_id: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default)]
    pub payload: SnapshotDelta,
    pub ts: TimestampMs,
}

impl EventEnvelope {
    pub fn identity(&self) -> EventKey {
        EventKey { stream_id: self.stream_id.clone(), kind: self.kind, ts: self.ts }
    }
}

/// Partial state carried by an envelope. Every field is optional; the
/// reconciler only touches fields that are present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_book: Option<OrderBook>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_history: Option<Vec<Candle>>,
    /// Full replacement trade list (`simulation_state`, `price_update`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent_trades: Option<Vec<Trade>>,
    /// Single incremental trade (`trade`, `processed_trade`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade: Option<Trade>,
    /// Incremental batch (`batch_update`), in backend order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trades: Option<Vec<Trade>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_positions: Option<Vec<Position>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trader_rankings: Option<Vec<Ranking>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_trades_processed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_running: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_paused: Option<bool>,
    /// Explicit reset marker from the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_phase_index: Option<u32>,
}

impl SnapshotDelta {
    /// Does this delta touch anything the derived-signal engine reads?
    pub fn affects_price_series(&self) -> bool {
        self.current_price.is_some() || self.price_history.is_some()
    }
}
