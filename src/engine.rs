//! The engine: one owned state, one event pipeline.
//!
//! Every component from the ingress gate to the chart lives in a single
//! struct, mutated on one logical thread of control. Timers are explicit
//! millisecond deadlines fired by [`Engine::tick`]; `ingest` itself never
//! blocks and never runs a trim, a recompute, or a redraw synchronously.

use crate::chart::{ChartEngine, SyncOutcome};
use crate::config::Config;
use crate::events::EventEnvelope;
use crate::ingress::DedupGate;
use crate::invariants;
use crate::logging::{log, obj, v_str, v_u64, Domain, Level};
use crate::memory::MemoryGovernor;
use crate::reconcile;
use crate::render::RenderFrame;
use crate::session::{GraceWindow, ResetCause, SessionDetector};
use crate::signal::SignalEngine;
use crate::snapshot::{MarketSnapshot, SimulationStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Dropped by the dedup gate; no side effects.
    Rejected,
    /// Merged into the canonical state; carries the reset cause if the
    /// session detector fired first.
    Applied { reset: Option<ResetCause> },
}

pub struct Engine {
    cfg: Config,
    snapshot: MarketSnapshot,
    status: SimulationStatus,
    detector: SessionDetector,
    grace: GraceWindow,
    gate: DedupGate,
    governor: MemoryGovernor,
    signal: SignalEngine,
    chart: ChartEngine,
}

impl Engine {
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            snapshot: MarketSnapshot::new(),
            status: SimulationStatus::default(),
            detector: SessionDetector::new(),
            grace: GraceWindow::default(),
            gate: DedupGate::new(),
            governor: MemoryGovernor::new(),
            signal: SignalEngine::new(),
            chart: ChartEngine::new(),
        }
    }

    /// Deterministic chart randomness for tests.
    pub fn with_chart(cfg: Config, chart: ChartEngine) -> Self {
        Self { chart, ..Self::new(cfg) }
    }

    // --- control contract -------------------------------------------------

    /// Bind the engine to a session stream. Binding over a different session
    /// is a handoff and hard-resets first.
    pub fn bind_session(&mut self, session_id: &str, now_ms: u64) {
        if let Some(cause) = self.detector.bind(session_id) {
            self.hard_reset(cause, now_ms);
        }
    }

    /// External reset request; always clears.
    pub fn force_reset(&mut self, now_ms: u64) {
        self.hard_reset(ResetCause::ExplicitSignal, now_ms);
    }

    /// Manual zoom/pan from the user; disables viewport auto-fit until the
    /// next reset.
    pub fn set_manual_viewport(&mut self, from: usize, to: usize) {
        self.chart.set_manual_viewport(from, to);
    }

    // --- bootstrap --------------------------------------------------------

    /// Seed the canonical state from the bootstrap fetch, before streaming.
    pub fn seed(&mut self, mut snapshot: MarketSnapshot, now_ms: u64) {
        snapshot.price_history = reconcile::normalize_history(snapshot.price_history);
        self.detector.observe_history_len(snapshot.price_history.len());
        self.snapshot = snapshot;
        self.governor.schedule(now_ms, self.cfg.trim_delay_ms);
        self.signal.request(now_ms, &self.cfg);
        let frame = self.snapshot.price_history.clone();
        self.sync_chart(&frame, now_ms);
        log(
            Level::Info,
            Domain::System,
            "seeded",
            obj(&[("candles", v_u64(self.snapshot.price_history.len() as u64))]),
        );
    }

    // --- pipeline ---------------------------------------------------------

    /// Run one envelope through gate, detector, and reconciler, and schedule
    /// the deferred stages.
    pub fn ingest(&mut self, env: &EventEnvelope, now_ms: u64) -> IngestOutcome {
        if !self.gate.admit(env, self.detector.epoch.session_id.as_deref()) {
            return IngestOutcome::Rejected;
        }
        self.detector.bind_if_unbound(&env.stream_id);

        let reset = self.detector.check_delta(&env.payload);
        if let Some(cause) = reset {
            self.hard_reset(cause, now_ms);
        }

        reconcile::apply(&mut self.snapshot, &mut self.status, &env.payload, env.kind);
        self.detector.observe_history_len(self.snapshot.price_history.len());

        if cfg!(debug_assertions) {
            if let Err(v) = invariants::assert_history_ordering(&self.snapshot.price_history) {
                log(Level::Error, Domain::Reconcile, "invariant", obj(&[("msg", v_str(&v.msg))]));
            }
        }

        self.governor.schedule(now_ms, self.cfg.trim_delay_ms);

        if env.payload.affects_price_series() || env.payload.trade.is_some() {
            self.signal.request(now_ms, &self.cfg);
        }
        // The chart validates the frame as delivered, not the normalized
        // canonical series; a frame the validator rejects never renders even
        // though the merge above already sorted it.
        if let Some(frame) = &env.payload.price_history {
            self.sync_chart(frame, now_ms);
        }

        IngestOutcome::Applied { reset }
    }

    /// Fire any due deferred work: memory trim, condition recompute, redraw.
    pub fn tick(&mut self, now_ms: u64) {
        if self.governor.due(now_ms) {
            self.governor.run(&mut self.snapshot, &self.cfg);
        }
        if self.signal.due(now_ms) {
            self.signal.run(&self.snapshot.price_history, self.snapshot.current_price, now_ms);
        }
        if self.chart.due(now_ms) {
            self.chart.tick(&self.snapshot.price_history, &mut self.grace, now_ms, &self.cfg);
        }
    }

    fn sync_chart(&mut self, frame: &[crate::snapshot::Candle], now_ms: u64) {
        let outcome = self.chart.sync(frame, &mut self.grace, now_ms, &self.cfg);
        if outcome == SyncOutcome::SkippedInvalid {
            log(
                Level::Warn,
                Domain::Chart,
                "frame_skipped",
                obj(&[("failures", v_u64(self.chart.validation_failures()))]),
            );
        }
    }

    fn hard_reset(&mut self, cause: ResetCause, _now_ms: u64) {
        self.snapshot.clear_for_reset();
        self.governor.reset();
        self.signal.reset();
        self.chart.reset();
        self.gate.clear_streams();
        self.grace.begin();
        self.detector.mark_reset();
        log(
            Level::Info,
            Domain::Session,
            "hard_reset",
            obj(&[
                ("cause", v_str(&format!("{:?}", cause))),
                ("reset_counter", v_u64(self.detector.epoch.reset_counter)),
            ]),
        );
    }

    // --- render contract --------------------------------------------------

    pub fn render_frame(&self) -> RenderFrame {
        RenderFrame {
            candles: self.chart.candles().to_vec(),
            volumes: self.chart.volumes().to_vec(),
            condition: self.signal.condition(),
            viewport: self.chart.viewport(),
        }
    }

    // --- observability ----------------------------------------------------

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn snapshot(&self) -> &MarketSnapshot {
        &self.snapshot
    }

    pub fn status(&self) -> &SimulationStatus {
        &self.status
    }

    pub fn messages_admitted(&self) -> u64 {
        self.gate.admitted()
    }

    pub fn messages_rejected(&self) -> u64 {
        self.gate.rejected()
    }

    pub fn reset_counter(&self) -> u64 {
        self.detector.epoch.reset_counter
    }

    pub fn session_id(&self) -> Option<&str> {
        self.detector.epoch.session_id.as_deref()
    }

    pub fn condition(&self) -> crate::signal::Condition {
        self.signal.condition()
    }

    pub fn grace_active(&self) -> bool {
        self.grace.is_active()
    }

    pub fn trims(&self) -> u64 {
        self.governor.trims()
    }
}
