//! Chart synchronization: canonical series in, render-ready frame out.
//!
//! The engine validates ordering before anything is shown, repairs minor
//! post-reset anomalies inside the grace window, and otherwise freezes at the
//! last known-good frame rather than rendering corrupted data. Redraws are
//! throttled with a trailing debounce so the final state always lands.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::config::Config;
use crate::logging::{log, obj, v_str, v_u64, Domain, Level};
use crate::session::GraceWindow;
use crate::snapshot::Candle;

/// Candles scanned by the ordering validator.
const SCAN_NORMAL: usize = 10;
const SCAN_GRACE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BarSign {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VolumeBar {
    pub time: u64,
    pub value: f64,
    pub sign: BarSign,
}

/// Visible candle range over indices, plus whether auto-fit still owns it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ViewportState {
    pub range: Option<(usize, usize)>,
    pub auto_fit: bool,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self { range: None, auto_fit: true }
    }
}

/// What a sync call did with the incoming frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Rendered,
    Repaired,
    Cleared,
    ImplicitReset,
    Deferred,
    SkippedInvalid,
}

#[derive(Debug)]
pub struct ChartEngine {
    candles: Vec<Candle>,
    volumes: Vec<VolumeBar>,
    viewport: ViewportState,
    last_render_ms: u64,
    pending_at: Option<u64>,
    validation_failures: u64,
    frames_rendered: u64,
    rng: StdRng,
}

impl ChartEngine {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic construction for tests.
    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            candles: Vec::new(),
            volumes: Vec::new(),
            viewport: ViewportState::default(),
            last_render_ms: 0,
            pending_at: None,
            validation_failures: 0,
            frames_rendered: 0,
            rng,
        }
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn volumes(&self) -> &[VolumeBar] {
        &self.volumes
    }

    pub fn viewport(&self) -> ViewportState {
        self.viewport
    }

    pub fn validation_failures(&self) -> u64 {
        self.validation_failures
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn pending(&self) -> bool {
        self.pending_at.is_some()
    }

    pub fn due(&self, now_ms: u64) -> bool {
        matches!(self.pending_at, Some(at) if now_ms >= at)
    }

    /// Synchronize with the canonical series, honoring the redraw throttle.
    /// An update inside the throttle interval is deferred to a trailing
    /// deadline and coalesced with later ones, never dropped.
    pub fn sync(
        &mut self,
        history: &[Candle],
        grace: &mut GraceWindow,
        now_ms: u64,
        cfg: &Config,
    ) -> SyncOutcome {
        if self.last_render_ms > 0 && now_ms < self.last_render_ms + cfg.redraw_throttle_ms {
            let at = self.last_render_ms + cfg.redraw_throttle_ms;
            self.pending_at = Some(self.pending_at.map_or(at, |p| p.min(at)));
            return SyncOutcome::Deferred;
        }
        self.render(history, grace, now_ms, cfg)
    }

    /// Fire a deferred redraw if its deadline has passed.
    pub fn tick(
        &mut self,
        history: &[Candle],
        grace: &mut GraceWindow,
        now_ms: u64,
        cfg: &Config,
    ) -> Option<SyncOutcome> {
        if !self.due(now_ms) {
            return None;
        }
        self.pending_at = None;
        Some(self.render(history, grace, now_ms, cfg))
    }

    fn render(
        &mut self,
        history: &[Candle],
        grace: &mut GraceWindow,
        now_ms: u64,
        cfg: &Config,
    ) -> SyncOutcome {
        // Empty series: the most common explicit-reset observable. Clears
        // the frame and viewport unconditionally.
        if history.is_empty() {
            self.clear_frame();
            self.last_render_ms = now_ms;
            return SyncOutcome::Cleared;
        }

        // Implicit reset: the series shrank under us without anyone calling
        // a reset. Clear now, render the fresh series on the next tick.
        if !self.candles.is_empty() && history.len() < self.candles.len() / 2 {
            log(
                Level::Warn,
                Domain::Chart,
                "implicit_reset",
                obj(&[
                    ("rendered", v_u64(self.candles.len() as u64)),
                    ("incoming", v_u64(history.len() as u64)),
                ]),
            );
            self.clear_frame();
            self.last_render_ms = now_ms;
            self.pending_at = Some(now_ms.saturating_add(1));
            return SyncOutcome::ImplicitReset;
        }

        grace.note_frame(cfg.grace_candle_budget);
        let relaxed = grace.is_active();
        let scan = if relaxed { SCAN_GRACE } else { SCAN_NORMAL };

        if ordered_prefix(history, scan) {
            self.commit(history.to_vec(), now_ms, cfg);
            grace.close();
            return SyncOutcome::Rendered;
        }

        if relaxed {
            let repaired = repair(history);
            if !repaired.is_empty() && strictly_increasing(&repaired) {
                log(
                    Level::Info,
                    Domain::Chart,
                    "grace_repair",
                    obj(&[
                        ("incoming", v_u64(history.len() as u64)),
                        ("kept", v_u64(repaired.len() as u64)),
                    ]),
                );
                self.commit(repaired, now_ms, cfg);
                grace.close();
                return SyncOutcome::Repaired;
            }
            // Repair failed: keep the prior frame and leave grace open for
            // the next event.
            self.validation_failures += 1;
            return SyncOutcome::SkippedInvalid;
        }

        self.validation_failures += 1;
        log(
            Level::Warn,
            Domain::Chart,
            "ordering_violation",
            obj(&[("incoming", v_u64(history.len() as u64)), ("action", v_str("skip_frame"))]),
        );
        SyncOutcome::SkippedInvalid
    }

    fn commit(&mut self, mut candles: Vec<Candle>, now_ms: u64, cfg: &Config) {
        // Defensive and idempotent; the accepted sequence is already ordered.
        candles.sort_by_key(|c| c.time);

        let prev_len = self.candles.len();
        self.volumes = candles
            .iter()
            .map(|c| VolumeBar {
                time: c.time,
                value: c.volume,
                sign: if c.close >= c.open { BarSign::Up } else { BarSign::Down },
            })
            .collect();
        self.candles = candles;
        self.last_render_ms = now_ms;
        self.frames_rendered += 1;

        self.fit_viewport(prev_len, cfg);
    }

    fn fit_viewport(&mut self, prev_len: usize, cfg: &Config) {
        let len = self.candles.len();
        if len == 0 {
            return;
        }

        match self.viewport.range {
            // First data after (re)initialization: deterministic fit to the
            // newest preferred window.
            None => {
                self.viewport.range = Some(newest_window(len, cfg.preferred_visible_candles));
            }
            Some((_, to)) if self.viewport.auto_fit && len > prev_len => {
                // Forced refit once the newest candle has drifted a full
                // max-window past the right edge; probabilistic otherwise so
                // the chart is not re-centered on every single candle.
                let drifted = len - 1 > to && (len - 1 - to) >= cfg.max_visible_candles;
                if drifted || self.rng.gen::<f64>() < cfg.viewport_refit_probability {
                    self.viewport.range = Some(newest_window(len, cfg.preferred_visible_candles));
                }
            }
            Some((from, to)) => {
                // Manual viewport: clamp to the data without re-centering.
                let last = len - 1;
                if to > last {
                    self.viewport.range = Some((from.min(last), last));
                }
            }
        }
    }

    /// User zoom/pan. Disables auto-fit until the next reset.
    pub fn set_manual_viewport(&mut self, from: usize, to: usize) {
        let len = self.candles.len();
        if len == 0 {
            return;
        }
        let last = len - 1;
        let to = to.min(last);
        let from = from.min(to);
        self.viewport = ViewportState { range: Some((from, to)), auto_fit: false };
    }

    fn clear_frame(&mut self) {
        self.candles.clear();
        self.volumes.clear();
        self.viewport = ViewportState::default();
    }

    /// Hard reset: drop the frame, the viewport, and any pending redraw.
    pub fn reset(&mut self) {
        self.clear_frame();
        self.pending_at = None;
        self.last_render_ms = 0;
    }
}

impl Default for ChartEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Strictly increasing over the first `scan` candles (or all, if fewer).
fn ordered_prefix(candles: &[Candle], scan: usize) -> bool {
    candles.iter().take(scan).zip(candles.iter().take(scan).skip(1)).all(|(a, b)| a.time < b.time)
}

fn strictly_increasing(candles: &[Candle]) -> bool {
    candles.windows(2).all(|w| w[0].time < w[1].time)
}

/// Grace-window repair, forward-drop rule: keep a candle only when it sits
/// strictly below its successor's time (the last candle always stays). The
/// offenders are dropped, nothing is reordered.
fn repair(candles: &[Candle]) -> Vec<Candle> {
    candles
        .iter()
        .enumerate()
        .filter(|(i, c)| match candles.get(i + 1) {
            Some(next) => c.time < next.time,
            None => true,
        })
        .map(|(_, c)| *c)
        .collect()
}

/// Index range covering the newest `width` candles.
fn newest_window(len: usize, width: usize) -> (usize, usize) {
    (len.saturating_sub(width), len - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(time: u64) -> Candle {
        Candle::flat(time, 100.0)
    }

    fn series(times: &[u64]) -> Vec<Candle> {
        times.iter().map(|&t| candle(t)).collect()
    }

    fn ascending(n: usize) -> Vec<Candle> {
        (0..n).map(|i| candle(i as u64 * 60)).collect()
    }

    fn chart() -> ChartEngine {
        // refit probability is exercised separately; seed keeps it stable.
        ChartEngine::with_rng(StdRng::seed_from_u64(7))
    }

    fn cfg() -> Config {
        Config { redraw_throttle_ms: 0, ..Config::default() }
    }

    #[test]
    fn test_valid_series_renders() {
        let mut c = chart();
        let mut grace = GraceWindow::default();
        let out = c.sync(&ascending(30), &mut grace, 1000, &cfg());
        assert_eq!(out, SyncOutcome::Rendered);
        assert_eq!(c.candles().len(), 30);
        assert_eq!(c.frames_rendered(), 1);
    }

    #[test]
    fn test_out_of_order_outside_grace_skips_frame() {
        let mut c = chart();
        let mut grace = GraceWindow::default();
        c.sync(&ascending(5), &mut grace, 0, &cfg());

        let out = c.sync(&series(&[300, 100, 200]), &mut grace, 1000, &cfg());
        assert_eq!(out, SyncOutcome::SkippedInvalid);
        assert_eq!(c.candles().len(), 5, "prior frame retained");
        assert_eq!(c.validation_failures(), 1);
    }

    #[test]
    fn test_grace_repair_forward_drop_rule() {
        let mut c = chart();
        let mut grace = GraceWindow::default();
        grace.begin();

        let out = c.sync(&series(&[300, 100, 200]), &mut grace, 0, &cfg());
        assert_eq!(out, SyncOutcome::Repaired);
        let times: Vec<u64> = c.candles().iter().map(|k| k.time).collect();
        assert_eq!(times, vec![100, 200], "300 dropped, survivors kept in order");
        assert!(!grace.is_active(), "successful repair closes the grace window");
    }

    #[test]
    fn test_grace_repair_unrecoverable_keeps_grace() {
        let mut c = chart();
        let mut grace = GraceWindow::default();
        grace.begin();

        // Forward-drop keeps [1, 1] here, still invalid: frame is skipped.
        let out = c.sync(&series(&[5, 1, 5, 1]), &mut grace, 0, &cfg());
        assert_eq!(out, SyncOutcome::SkippedInvalid);
        assert!(grace.is_active(), "failed repair retains grace");
        assert!(c.candles().is_empty(), "nothing rendered from an invalid frame");
    }

    #[test]
    fn test_grace_validation_scans_short_prefix() {
        let mut c = chart();
        let mut grace = GraceWindow::default();
        grace.begin();

        // First three ordered; a violation at index 5 is beyond the relaxed
        // scan and the frame renders as-is (then gets defensively sorted).
        let out = c.sync(&series(&[10, 20, 30, 40, 25, 50]), &mut grace, 0, &cfg());
        assert_eq!(out, SyncOutcome::Rendered);
        assert!(strictly_increasing(c.candles()), "defensive sort applies");
    }

    #[test]
    fn test_empty_series_clears_chart_and_viewport() {
        let mut c = chart();
        let mut grace = GraceWindow::default();
        c.sync(&ascending(30), &mut grace, 0, &cfg());
        assert!(c.viewport().range.is_some());

        let out = c.sync(&[], &mut grace, 1000, &cfg());
        assert_eq!(out, SyncOutcome::Cleared);
        assert!(c.candles().is_empty());
        assert!(c.volumes().is_empty());
        assert_eq!(c.viewport().range, None);
        assert!(c.viewport().auto_fit);
    }

    #[test]
    fn test_significant_shrink_clears_then_rerenders() {
        let mut c = chart();
        let mut grace = GraceWindow::default();
        let cfg = cfg();
        c.sync(&ascending(500), &mut grace, 0, &cfg);

        let fresh = ascending(40);
        let out = c.sync(&fresh, &mut grace, 1000, &cfg);
        assert_eq!(out, SyncOutcome::ImplicitReset);
        assert!(c.candles().is_empty(), "cleared first");
        assert!(c.pending(), "re-render scheduled for next tick");

        let out = c.tick(&fresh, &mut grace, 1002, &cfg);
        assert_eq!(out, Some(SyncOutcome::Rendered));
        assert_eq!(c.candles().len(), 40);
        // Fresh series gets the deterministic first-fit viewport.
        assert_eq!(c.viewport().range, Some((15, 39)), "preferred 25 of 40, newest");
        assert!(c.viewport().auto_fit);
    }

    #[test]
    fn test_first_fit_viewport_deterministic() {
        let mut c = chart();
        let mut grace = GraceWindow::default();
        c.sync(&ascending(100), &mut grace, 0, &cfg());
        assert_eq!(c.viewport().range, Some((75, 99)));
    }

    #[test]
    fn test_first_fit_with_few_candles() {
        let mut c = chart();
        let mut grace = GraceWindow::default();
        c.sync(&ascending(10), &mut grace, 0, &cfg());
        assert_eq!(c.viewport().range, Some((0, 9)), "window clamps to available data");
    }

    #[test]
    fn test_manual_viewport_disables_auto_fit() {
        let mut c = chart();
        let mut grace = GraceWindow::default();
        let cfg = cfg();
        c.sync(&ascending(100), &mut grace, 0, &cfg);

        c.set_manual_viewport(10, 30);
        assert_eq!(c.viewport().range, Some((10, 30)));
        assert!(!c.viewport().auto_fit);

        // Plenty of new candles; manual viewport must not re-center.
        c.sync(&ascending(200), &mut grace, 1000, &cfg);
        assert_eq!(c.viewport().range, Some((10, 30)));
    }

    #[test]
    fn test_auto_fit_refits_eventually() {
        let mut c = chart();
        let mut grace = GraceWindow::default();
        let cfg = Config { redraw_throttle_ms: 0, viewport_refit_probability: 1.0, ..Config::default() };
        c.sync(&ascending(50), &mut grace, 0, &cfg);
        assert_eq!(c.viewport().range, Some((25, 49)));

        c.sync(&ascending(60), &mut grace, 1000, &cfg);
        assert_eq!(c.viewport().range, Some((35, 59)), "p=1.0 refits every growth");
    }

    #[test]
    fn test_auto_fit_zero_probability_forced_by_drift() {
        let mut c = chart();
        let mut grace = GraceWindow::default();
        let cfg = Config { redraw_throttle_ms: 0, viewport_refit_probability: 0.0, ..Config::default() };
        c.sync(&ascending(50), &mut grace, 0, &cfg);
        let before = c.viewport().range;

        // Small growth: no refit at p=0.
        c.sync(&ascending(55), &mut grace, 1000, &cfg);
        assert_eq!(c.viewport().range, before);

        // Newest candle a full max-window past the right edge: forced.
        c.sync(&ascending(50 + cfg.max_visible_candles + 1), &mut grace, 2000, &cfg);
        let (_, to) = c.viewport().range.unwrap();
        assert_eq!(to, 50 + cfg.max_visible_candles, "refit to newest");
    }

    #[test]
    fn test_redraw_throttle_defers_and_coalesces() {
        let mut c = chart();
        let mut grace = GraceWindow::default();
        let cfg = Config { redraw_throttle_ms: 50, ..Config::default() };

        assert_eq!(c.sync(&ascending(10), &mut grace, 1000, &cfg), SyncOutcome::Rendered);
        // Two updates inside the window: both defer to the same deadline.
        assert_eq!(c.sync(&ascending(11), &mut grace, 1010, &cfg), SyncOutcome::Deferred);
        assert_eq!(c.sync(&ascending(12), &mut grace, 1020, &cfg), SyncOutcome::Deferred);
        assert_eq!(c.candles().len(), 10, "frame unchanged while deferred");

        assert!(c.tick(&ascending(12), &mut grace, 1040, &cfg).is_none(), "not due yet");
        let out = c.tick(&ascending(12), &mut grace, 1050, &cfg);
        assert_eq!(out, Some(SyncOutcome::Rendered));
        assert_eq!(c.candles().len(), 12, "final state eventually rendered");
    }

    #[test]
    fn test_volume_bars_signed_by_candle_direction() {
        let mut c = chart();
        let mut grace = GraceWindow::default();
        let candles = vec![
            Candle { time: 1, open: 10.0, high: 12.0, low: 9.0, close: 11.0, volume: 5.0 },
            Candle { time: 2, open: 11.0, high: 11.5, low: 9.5, close: 10.0, volume: 3.0 },
        ];
        c.sync(&candles, &mut grace, 0, &cfg());
        assert_eq!(c.volumes()[0].sign, BarSign::Up);
        assert_eq!(c.volumes()[1].sign, BarSign::Down);
        assert_eq!(c.volumes()[1].value, 3.0);
    }

    #[test]
    fn test_reset_cancels_pending_redraw() {
        let mut c = chart();
        let mut grace = GraceWindow::default();
        let cfg = Config { redraw_throttle_ms: 50, ..Config::default() };
        c.sync(&ascending(10), &mut grace, 1000, &cfg);
        c.sync(&ascending(11), &mut grace, 1010, &cfg);
        assert!(c.pending());

        c.reset();
        assert!(!c.pending(), "stale timer must not fire into fresh state");
        assert!(c.candles().is_empty());
        assert!(c.viewport().auto_fit);
    }

    #[test]
    fn test_repair_rule_examples() {
        let kept: Vec<u64> = repair(&series(&[300, 100, 200])).iter().map(|c| c.time).collect();
        assert_eq!(kept, vec![100, 200]);

        let kept: Vec<u64> = repair(&series(&[100, 100, 200])).iter().map(|c| c.time).collect();
        assert_eq!(kept, vec![100, 200], "duplicate collapses to its last copy");

        let kept: Vec<u64> = repair(&series(&[100])).iter().map(|c| c.time).collect();
        assert_eq!(kept, vec![100]);
    }
}
