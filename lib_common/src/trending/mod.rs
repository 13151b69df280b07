//! # Trending Games Module
//!
//! Persistent trending-games state for the bits tracker. The store owns the
//! single JSON document of per-game totals, the engine turns cheer events
//! into ranked snapshots, and the display sinks mirror the top entries to
//! plain-text artifacts for the overlay.

/// Plain-text display artifacts for the ranked snapshot.
pub mod display;
/// The cheer-to-ranking engine.
pub mod engine;
/// The persistent game-record store.
pub mod store;

// --- Public API Re-exports ---
pub use display::{DisplaySink, FileDisplaySink};
pub use engine::{parse_game_id, EngineError, TrendingEngine, TRENDING_SLOTS};
pub use store::{GameDb, GameRecord, StoreError, TrendingStore, DEFAULT_PRIORITY};
