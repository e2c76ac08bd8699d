//! MEV detection core.
//!
//! This crate provides the detection engine:
//! - Arbitrage detection over the live exchange-rate graph (bounded
//!   negative-cycle search + exact re-simulation)
//! - Liquidation monitoring with exposure-indexed health factor recompute
//!   and sensitivity-based fast estimation
//! - Sandwich detection over decoded mempool swaps with a competition
//!   heuristic
//! - Opportunity scoring, global filters, windowed deduplication and ranking
//! - Orchestration: subscription routing, per-event deadlines, reorg
//!   rollback, backpressure
//!
//! Event ingestion, execution and persistence live behind the seams in
//! `mevscan-feed`; world state and pricing live in `mevscan-state`.

mod arbitrage;
pub mod config;
mod deadline;
mod error;
mod liquidation;
pub mod math;
mod metrics;
mod orchestrator;
mod sandwich;
mod scorer;
mod sensitivity;

pub use arbitrage::ArbitrageDetector;
pub use config::{
    config, init_config, ArbitrageConfig, EngineConfig, LiquidationConfig, OrchestratorConfig,
    SandwichConfig, ScoringConfig,
};
pub use deadline::Deadline;
pub use error::DetectError;
pub use liquidation::LiquidationMonitor;
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use orchestrator::{DetectorId, Orchestrator};
pub use sandwich::SandwichDetector;
pub use scorer::{Candidate, Scorer};
pub use sensitivity::PositionSensitivity;
