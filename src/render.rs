//! Render output contract for the presentation layer, plus cosmetic display
//! enrichment that never feeds back into engine state.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::chart::{ViewportState, VolumeBar};
use crate::signal::Condition;
use crate::snapshot::{Candle, Ranking};

/// One frame handed to the presentation layer. Cloned out of the engine; the
/// UI never holds a reference into live state.
#[derive(Debug, Clone, Serialize)]
pub struct RenderFrame {
    pub candles: Vec<Candle>,
    pub volumes: Vec<VolumeBar>,
    pub condition: Condition,
    pub viewport: ViewportState,
}

/// A trader-ranking row decorated for display.
#[derive(Debug, Clone, Serialize)]
pub struct RankingRow {
    pub rank: u32,
    pub trader_id: String,
    pub pnl: f64,
    pub trade_count: u64,
    /// Cosmetic stake figure, deterministic per trader id.
    pub display_stake: f64,
    /// Stable six-hex-digit color tag derived from the trader id.
    pub color_tag: String,
}

/// Deterministic per-trader jitter in `[0.75, 1.25)`, seeded from a sha256 of
/// the id so the same trader always shows the same stake.
fn stake_jitter(trader_id: &str) -> f64 {
    let digest = Sha256::digest(trader_id.as_bytes());
    let mut seed = [0u8; 8];
    seed.copy_from_slice(&digest[..8]);
    let mut rng = StdRng::seed_from_u64(u64::from_le_bytes(seed));
    0.75 + rng.gen::<f64>() * 0.5
}

/// Stable display color per trader, from the tail of the same digest.
fn color_tag(trader_id: &str) -> String {
    let digest = Sha256::digest(trader_id.as_bytes());
    hex::encode(&digest[29..32])
}

/// Decorate rankings for display. `base_stake` is the nominal stake the
/// dashboard shows per trader before jitter.
pub fn ranking_rows(rankings: &[Ranking], base_stake: f64) -> Vec<RankingRow> {
    rankings
        .iter()
        .map(|r| RankingRow {
            rank: r.rank,
            trader_id: r.trader_id.clone(),
            pnl: r.pnl,
            trade_count: r.trade_count,
            display_stake: base_stake * stake_jitter(&r.trader_id),
            color_tag: color_tag(&r.trader_id),
        })
        .collect()
}
