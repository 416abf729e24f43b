//! Async driver: the only place that touches the wall clock or awaits.
//!
//! The transport and control plane are external collaborators. They hand
//! envelopes to the engine through an mpsc channel; the driver ticks the
//! engine's deferred deadlines on a fixed period and publishes a render
//! frame through a watch channel after every state change.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration};

use crate::engine::{Engine, IngestOutcome};
use crate::events::EventEnvelope;
use crate::logging::{log, obj, v_str, v_u64, Domain, Level};
use crate::render::RenderFrame;
use crate::snapshot::MarketSnapshot;

/// Wall clock in epoch milliseconds.
pub fn now_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Bootstrap seam: fetches the initial snapshot before streaming begins.
#[async_trait]
pub trait SnapshotSource {
    async fn fetch_initial(&self, session_id: &str) -> Result<MarketSnapshot>;
}

/// Fetch the initial state, bind the session, and seed the reconciler.
pub async fn bootstrap(
    engine: &mut Engine,
    source: &dyn SnapshotSource,
    session_id: &str,
) -> Result<()> {
    let snapshot = source.fetch_initial(session_id).await?;
    let now = now_ms();
    engine.bind_session(session_id, now);
    engine.seed(snapshot, now);
    Ok(())
}

/// Tick period for deferred deadlines. Finer than the redraw throttle so a
/// trailing deadline never waits a full extra frame.
const TICK_MS: u64 = 10;

/// Drive the engine until the transport closes the channel.
pub async fn run(
    mut engine: Engine,
    mut events: mpsc::Receiver<EventEnvelope>,
    frames: watch::Sender<RenderFrame>,
) -> Result<Engine> {
    let mut ticker = interval(Duration::from_millis(TICK_MS));
    log(Level::Info, Domain::System, "driver_start", obj(&[]));

    loop {
        tokio::select! {
            maybe_env = events.recv() => {
                match maybe_env {
                    Some(env) => {
                        let outcome = engine.ingest(&env, now_ms());
                        if outcome != IngestOutcome::Rejected {
                            let _ = frames.send(engine.render_frame());
                        }
                    }
                    None => break,
                }
            }
            _ = ticker.tick() => {
                engine.tick(now_ms());
                let _ = frames.send(engine.render_frame());
            }
        }
    }

    // Teardown: nothing left to fire the deadlines, so surface the state we
    // stopped in and hand the engine back.
    log(
        Level::Info,
        Domain::System,
        "driver_stop",
        obj(&[
            ("admitted", v_u64(engine.messages_admitted())),
            ("rejected", v_u64(engine.messages_rejected())),
            ("resets", v_u64(engine.reset_counter())),
            ("condition", v_str(engine.condition().as_str())),
        ]),
    );
    Ok(engine)
}
