//! Reset and recovery behavior: explicit resets, silent restarts, session
//! handoffs, and the post-reset grace window.

use rand::rngs::StdRng;
use rand::SeedableRng;

use marketsync::chart::ChartEngine;
use marketsync::config::Config;
use marketsync::engine::{Engine, IngestOutcome};
use marketsync::events::{EventEnvelope, EventKind, SnapshotDelta};
use marketsync::session::ResetCause;
use marketsync::signal::Condition;
use marketsync::snapshot::Candle;

fn engine() -> Engine {
    let cfg = Config { redraw_throttle_ms: 0, trim_delay_ms: 0, ..Config::default() };
    Engine::with_chart(cfg, ChartEngine::with_rng(StdRng::seed_from_u64(9)))
}

fn ascending(n: usize) -> Vec<Candle> {
    (0..n).map(|i| Candle::flat(i as u64 * 60, 100.0)).collect()
}

fn history_event(stream: &str, ts: u64, history: Vec<Candle>) -> EventEnvelope {
    EventEnvelope {
        stream_id: stream.into(),
        kind: EventKind::CandleUpdate,
        payload: SnapshotDelta { price_history: Some(history), ..Default::default() },
        ts,
    }
}

// ---------------------------------------------------------------------------
// Explicit reset
// ---------------------------------------------------------------------------

#[test]
fn force_reset_clears_everything_once() {
    let mut e = engine();
    e.ingest(&history_event("s1", 1, ascending(50)), 0);
    assert_eq!(e.render_frame().candles.len(), 50);

    e.force_reset(1000);

    assert!(e.snapshot().price_history.is_empty());
    assert!(e.snapshot().recent_trades.is_empty());
    assert!(e.snapshot().active_positions.is_empty());
    assert!(e.render_frame().candles.is_empty());
    assert!(e.render_frame().viewport.range.is_none());
    assert!(e.render_frame().viewport.auto_fit, "manual zoom forgotten on reset");
    assert_eq!(e.render_frame().condition, Condition::Building);
    assert_eq!(e.reset_counter(), 1, "incremented exactly once");
}

#[test]
fn reset_event_from_backend_clears() {
    let mut e = engine();
    e.ingest(&history_event("s1", 1, ascending(20)), 0);

    let reset = EventEnvelope {
        stream_id: "s1".into(),
        kind: EventKind::SimulationState,
        payload: SnapshotDelta { reset: Some(true), ..Default::default() },
        ts: 2,
    };
    let out = e.ingest(&reset, 100);

    assert_eq!(out, IngestOutcome::Applied { reset: Some(ResetCause::ExplicitSignal) });
    assert!(e.snapshot().price_history.is_empty());
    assert!(e.render_frame().candles.is_empty());
}

// ---------------------------------------------------------------------------
// Silent restart (series shrink)
// ---------------------------------------------------------------------------

#[test]
fn shrink_without_session_change_rerenders_fresh() {
    let mut e = engine();
    e.ingest(&history_event("s1", 1, ascending(500)), 0);
    assert_eq!(e.render_frame().candles.len(), 500);

    let out = e.ingest(&history_event("s1", 2, ascending(40)), 1000);

    assert_eq!(out, IngestOutcome::Applied { reset: Some(ResetCause::SeriesShrink) });
    assert_eq!(e.reset_counter(), 1);
    let frame = e.render_frame();
    assert_eq!(frame.candles.len(), 40, "fresh series rendered");
    assert_eq!(frame.viewport.range, Some((15, 39)), "auto-fit: newest 25 of 40");
    assert!(frame.viewport.auto_fit);
}

#[test]
fn steady_shrink_above_half_is_not_a_reset() {
    let mut e = engine();
    e.ingest(&history_event("s1", 1, ascending(100)), 0);
    let out = e.ingest(&history_event("s1", 2, ascending(60)), 100);
    assert_eq!(out, IngestOutcome::Applied { reset: None });
    assert_eq!(e.reset_counter(), 0);
}

// ---------------------------------------------------------------------------
// Session handoff
// ---------------------------------------------------------------------------

#[test]
fn handoff_resets_and_rebinds() {
    let mut e = engine();
    e.bind_session("sess-a", 0);
    e.ingest(&history_event("sess-a", 1, ascending(30)), 0);

    // Foreign stream while bound: dropped at the gate, no state change.
    let out = e.ingest(&history_event("sess-b", 1, ascending(5)), 50);
    assert_eq!(out, IngestOutcome::Rejected);
    assert_eq!(e.snapshot().price_history.len(), 30);

    // Control plane rebinding is the handoff path.
    e.bind_session("sess-b", 100);
    assert_eq!(e.reset_counter(), 1);
    assert_eq!(e.session_id(), Some("sess-b"));
    assert!(e.snapshot().price_history.is_empty());

    let out = e.ingest(&history_event("sess-b", 2, ascending(5)), 200);
    assert!(matches!(out, IngestOutcome::Applied { .. }));
    assert_eq!(e.render_frame().candles.len(), 5);
}

// ---------------------------------------------------------------------------
// Grace window
// ---------------------------------------------------------------------------

#[test]
fn grace_repairs_irregular_series_after_reset() {
    let mut e = engine();
    e.ingest(&history_event("s1", 1, ascending(10)), 0);
    e.force_reset(100);
    assert!(e.grace_active());

    // Re-seeded series arrives with one stray leading timestamp.
    let irregular =
        vec![Candle::flat(300, 1.0), Candle::flat(100, 1.0), Candle::flat(200, 1.0)];
    e.ingest(&history_event("s1", 2, irregular), 200);

    let times: Vec<u64> = e.render_frame().candles.iter().map(|c| c.time).collect();
    assert_eq!(times, vec![100, 200], "deterministic forward-drop repair");
    assert!(!e.grace_active(), "one good pass closes the window");
}

#[test]
fn same_irregular_series_outside_grace_is_skipped() {
    let mut e = engine();
    e.ingest(&history_event("s1", 1, ascending(5)), 0);

    let irregular =
        vec![Candle::flat(300, 1.0), Candle::flat(100, 1.0), Candle::flat(200, 1.0)];
    e.ingest(&history_event("s1", 2, irregular), 100);

    assert_eq!(e.render_frame().candles.len(), 5, "prior render retained");
}

#[test]
fn grace_expires_after_budget() {
    let cfg = Config {
        redraw_throttle_ms: 0,
        trim_delay_ms: 0,
        grace_candle_budget: 2,
        ..Config::default()
    };
    let mut e = Engine::with_chart(cfg, ChartEngine::with_rng(StdRng::seed_from_u64(9)));

    e.ingest(&history_event("s1", 1, ascending(10)), 0);
    e.force_reset(100);
    assert!(e.grace_active());

    // Valid frames close grace immediately; an unrepairable one keeps it
    // open only until the budget runs out.
    let junk = vec![Candle::flat(5, 1.0), Candle::flat(1, 1.0), Candle::flat(5, 2.0), Candle::flat(1, 3.0)];
    e.ingest(&history_event("s1", 2, junk.clone()), 200);
    assert!(e.grace_active(), "failed repair keeps grace for the next event");
    e.ingest(&history_event("s1", 3, junk.clone()), 300);
    e.ingest(&history_event("s1", 4, junk), 400);
    assert!(!e.grace_active(), "budget forces the window shut");
}

#[test]
fn repeated_resets_keep_counter_monotonic() {
    let mut e = engine();
    e.ingest(&history_event("s1", 1, ascending(10)), 0);
    e.force_reset(100);
    e.ingest(&history_event("s1", 2, ascending(10)), 200);
    e.force_reset(300);

    assert_eq!(e.reset_counter(), 2);
    assert!(e.snapshot().price_history.is_empty());
}
