//! State reconciler: merges event deltas into the canonical snapshot.
//!
//! Merge rules are per-field and only fire when the field is present in the
//! delta. Replacement fields trust the backend wholesale (it always sends the
//! authoritative tail/window after a gap); only trade lists have an
//! incremental mode.

use crate::events::{EventKind, SnapshotDelta};
use crate::snapshot::{Candle, MarketSnapshot, ScenarioStatus, SimulationStatus, Trade};

/// Sort ascending by timestamp and collapse duplicate timestamps, last-wins.
pub fn normalize_history(mut candles: Vec<Candle>) -> Vec<Candle> {
    // Stable sort keeps arrival order among equal timestamps, so the last
    // arrival for a timestamp is the last of its run.
    candles.sort_by_key(|c| c.time);
    let mut out: Vec<Candle> = Vec::with_capacity(candles.len());
    for c in candles {
        match out.last_mut() {
            Some(prev) if prev.time == c.time => *prev = c,
            _ => out.push(c),
        }
    }
    out
}

/// Drop trades whose id was already seen, keeping the first occurrence.
/// The list is newest-first, so "first" is the newest copy.
fn dedup_trades(trades: Vec<Trade>) -> Vec<Trade> {
    let mut seen = std::collections::HashSet::with_capacity(trades.len());
    trades.into_iter().filter(|t| seen.insert(t.id.clone())).collect()
}

/// Prepend the unseen incoming trades, preserving backend order.
fn prepend_unseen(existing: &mut Vec<Trade>, incoming: Vec<Trade>) {
    let known: std::collections::HashSet<&str> =
        existing.iter().map(|t| t.id.as_str()).collect();
    let mut fresh: Vec<Trade> =
        incoming.into_iter().filter(|t| !known.contains(t.id.as_str())).collect();
    if fresh.is_empty() {
        return;
    }
    fresh.append(existing);
    *existing = fresh;
}

/// Apply a delta to the canonical state. Mutates in place and returns the
/// snapshot reference, per the reconciler contract.
pub fn apply<'a>(
    snapshot: &'a mut MarketSnapshot,
    status: &mut SimulationStatus,
    delta: &SnapshotDelta,
    kind: EventKind,
) -> &'a MarketSnapshot {
    if let Some(price) = delta.current_price {
        snapshot.current_price = price;
    }

    if let Some(book) = &delta.order_book {
        snapshot.order_book = book.clone();
    }

    if let Some(history) = &delta.price_history {
        snapshot.price_history = normalize_history(history.clone());
    }

    if let Some(trades) = &delta.recent_trades {
        if kind.replaces_trades() {
            snapshot.recent_trades = dedup_trades(trades.clone());
        } else {
            // A non-replacement kind carrying a full list is treated as a
            // batch: same unseen-prepend rule as `trades`.
            prepend_unseen(&mut snapshot.recent_trades, trades.clone());
        }
    }

    if let Some(trade) = &delta.trade {
        if !snapshot.recent_trades.iter().any(|t| t.id == trade.id) {
            snapshot.recent_trades.insert(0, trade.clone());
        }
    }

    if let Some(batch) = &delta.trades {
        prepend_unseen(&mut snapshot.recent_trades, batch.clone());
    }

    if let Some(positions) = &delta.active_positions {
        snapshot.active_positions = positions.clone();
    }

    if let Some(rankings) = &delta.trader_rankings {
        snapshot.trader_rankings = rankings.clone();
    }

    if let Some(total) = delta.total_trades_processed {
        snapshot.total_trades_processed = total;
    }

    merge_status(status, delta, kind);

    snapshot
}

/// Simulation flags and scenario lifecycle, merged field-by-field into the
/// separately owned status record.
fn merge_status(status: &mut SimulationStatus, delta: &SnapshotDelta, kind: EventKind) {
    if let Some(running) = delta.is_running {
        status.is_running = running;
    }
    if let Some(paused) = delta.is_paused {
        status.is_paused = paused;
    }

    match kind {
        EventKind::ScenarioStarted => {
            status.scenario = Some(ScenarioStatus {
                name: delta.scenario_name.clone().unwrap_or_default(),
                phase: delta.scenario_phase.clone().unwrap_or_default(),
                phase_index: delta.scenario_phase_index.unwrap_or(0),
                active: true,
            });
        }
        EventKind::ScenarioPhaseUpdate | EventKind::ScenarioPhaseTransition => {
            if let Some(scenario) = status.scenario.as_mut() {
                if let Some(phase) = &delta.scenario_phase {
                    scenario.phase = phase.clone();
                }
                if let Some(idx) = delta.scenario_phase_index {
                    scenario.phase_index = idx;
                }
            }
        }
        EventKind::ScenarioEnded => {
            // Last phase stays visible; only the active flag drops.
            if let Some(scenario) = status.scenario.as_mut() {
                scenario.active = false;
            }
        }
        _ => {}
    }
}
