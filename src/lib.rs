//! Client-side sync engine for a live trading-simulation dashboard.
//!
//! Keeps a canonical, duplicate-free, time-ordered market state consistent
//! with an unreliable push stream, and turns it into render-ready chart
//! frames under a throttled redraw budget.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │  Transport   │────►│  Dedup Gate  │────►│  Reconciler  │
//! │  (external)  │     │  (O(1) drop) │     │  (merge)     │
//! └──────────────┘     └──────────────┘     └──────┬───────┘
//!                                                  │
//!                     ┌──────────────┬─────────────┼─────────────┐
//!                     ▼              ▼             ▼             ▼
//!              ┌────────────┐ ┌────────────┐ ┌───────────┐ ┌──────────┐
//!              │  Memory    │ │  Derived   │ │  Chart    │ │ Session/ │
//!              │  Governor  │ │  Signal    │ │  Sync     │ │ Reset    │
//!              │  (trim)    │ │  (classify)│ │  (render) │ │ Detector │
//!              └────────────┘ └────────────┘ └───────────┘ └──────────┘
//! ```
//!
//! All mutation happens on one logical thread of control; deferred work
//! (trims, condition recomputes, redraws) runs on explicit deadlines fired by
//! [`engine::Engine::tick`], cancelled on teardown and on every hard reset.

pub mod chart;
pub mod config;
pub mod driver;
pub mod engine;
pub mod events;
pub mod ingress;
pub mod invariants;
pub mod logging;
pub mod memory;
pub mod reconcile;
pub mod render;
pub mod session;
pub mod signal;
pub mod snapshot;
