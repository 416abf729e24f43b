//! Session binding, reset detection, and the post-reset grace window.
//!
//! A hard reset is always safe: it returns every collection to a well-defined
//! empty state. The detector prefers that over trying to repair a stream that
//! has discontinued (new session, explicit reset, or a series that silently
//! shrank under it).

use serde::Serialize;

use crate::events::SnapshotDelta;

/// Session identity plus a monotonic reset counter. The counter only ever
/// increases.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionEpoch {
    pub session_id: Option<String>,
    pub reset_counter: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetCause {
    SessionHandoff,
    ExplicitSignal,
    SeriesShrink,
}

/// Relaxed-validation window after a hard reset. Freshly re-seeded series
/// often carry minor timestamp irregularities; the chart's validator runs a
/// shorter scan while this is open.
#[derive(Debug, Default)]
pub struct GraceWindow {
    active: bool,
    frames_seen: u32,
}

impl GraceWindow {
    pub fn begin(&mut self) {
        self.active = true;
        self.frames_seen = 0;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Close after one full validation pass succeeds.
    pub fn close(&mut self) {
        self.active = false;
        self.frames_seen = 0;
    }

    /// Count a synced frame; force the window shut once the budget is spent.
    pub fn note_frame(&mut self, budget: u32) {
        if !self.active {
            return;
        }
        self.frames_seen += 1;
        if self.frames_seen > budget {
            self.active = false;
        }
    }
}

#[derive(Debug, Default)]
pub struct SessionDetector {
    pub epoch: SessionEpoch,
    /// Canonical candle-series length after the last merge; the baseline for
    /// the shrink heuristic.
    last_history_len: usize,
}

impl SessionDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Control-plane session binding. Binding a different id than the current
    /// one is a session handoff and demands a reset.
    pub fn bind(&mut self, session_id: &str) -> Option<ResetCause> {
        match self.epoch.session_id.as_deref() {
            Some(bound) if bound == session_id => None,
            Some(_) => {
                self.epoch.session_id = Some(session_id.to_string());
                Some(ResetCause::SessionHandoff)
            }
            None => {
                self.epoch.session_id = Some(session_id.to_string());
                None
            }
        }
    }

    /// First admitted stream binds an unbound engine.
    pub fn bind_if_unbound(&mut self, stream_id: &str) {
        if self.epoch.session_id.is_none() {
            self.epoch.session_id = Some(stream_id.to_string());
        }
    }

    /// Inspect an admitted delta for reset conditions, in precedence order:
    /// explicit signal, then the silent-restart shrink heuristic.
    pub fn check_delta(&self, delta: &SnapshotDelta) -> Option<ResetCause> {
        if delta.reset == Some(true) {
            return Some(ResetCause::ExplicitSignal);
        }
        if let Some(history) = &delta.price_history {
            // A series less than half the previously observed length means
            // the backend restarted without a session-id change.
            if self.last_history_len >= 4 && history.len() < self.last_history_len / 2 {
                return Some(ResetCause::SeriesShrink);
            }
        }
        None
    }

    /// Record the canonical series length after a merge.
    pub fn observe_history_len(&mut self, len: usize) {
        self.last_history_len = len;
    }

    /// Bump the epoch for a hard reset and forget the shrink baseline.
    pub fn mark_reset(&mut self) {
        self.epoch.reset_counter += 1;
        self.last_history_len = 0;
    }
}
