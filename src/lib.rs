//! Cell Arena Server Library
//!
//! Per-connection player sessions for a cell-growth arena game: what each
//! client sees, where its camera points, how it decays under anti-teaming
//! pressure and how long its cells linger after a disconnect.
//!
//! # Features
//!
//! - `metrics_extended` - per-tick visibility counters (full refreshes, node churn) (enabled by default)

pub mod config;
pub mod util;
pub mod game;
pub mod net;
pub mod session;
pub mod metrics;
