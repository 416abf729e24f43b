//! Offline replay: feed a JSONL file of event envelopes through the engine
//! and print a frame summary per event. Audit tool for captured sessions.
//!
//! Usage: replay <events.jsonl> [step_ms]

use std::fs::File;
use std::io::{BufRead, BufReader};

use anyhow::{Context, Result};

use marketsync::config::Config;
use marketsync::engine::{Engine, IngestOutcome};
use marketsync::events::EventEnvelope;
use marketsync::invariants;

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let path = args.next().context("usage: replay <events.jsonl> [step_ms]")?;
    let step_ms: u64 = args.next().and_then(|v| v.parse().ok()).unwrap_or(25);

    let file = File::open(&path).with_context(|| format!("cannot open {}", path))?;
    let mut engine = Engine::new(Config::from_env());
    let mut now: u64 = 0;
    let mut line_no = 0usize;

    for line in BufReader::new(file).lines() {
        let line = line?;
        line_no += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let env: EventEnvelope = serde_json::from_str(trimmed)
            .with_context(|| format!("bad envelope at line {}", line_no))?;

        now += step_ms;
        let outcome = engine.ingest(&env, now);
        engine.tick(now + step_ms);

        let frame = engine.render_frame();
        println!(
            "{} {} kind={:?} candles={} trades={} condition={} resets={}",
            line_no,
            outcome_tag(&outcome),
            env.kind,
            frame.candles.len(),
            engine.snapshot().recent_trades.len(),
            frame.condition.as_str(),
            engine.reset_counter(),
        );
    }

    // Drain any trailing deferred work before the final audit.
    engine.tick(now + 10_000);
    if let Err(v) = invariants::assert_snapshot(engine.snapshot(), engine.config()) {
        eprintln!("INVARIANT VIOLATION: {}", v.msg);
        std::process::exit(1);
    }

    println!(
        "done: admitted={} rejected={} resets={}",
        engine.messages_admitted(),
        engine.messages_rejected(),
        engine.reset_counter()
    );
    Ok(())
}

fn outcome_tag(outcome: &IngestOutcome) -> &'static str {
    match outcome {
        IngestOutcome::Rejected => "drop",
        IngestOutcome::Applied { reset: Some(_) } => "reset",
        IngestOutcome::Applied { reset: None } => "apply",
    }
}
