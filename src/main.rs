//! mevscan — MEV opportunity detection engine
//!
//! Turns a stream of decoded on-chain events into ranked, deduplicated,
//! profit-net-of-gas MEV opportunity records. Features:
//! - Versioned, reorg-safe world state with point-in-time snapshots
//! - Arbitrage, liquidation and sandwich detectors behind a routing table
//! - Per-event deadlines with cooperative cancellation
//! - Windowed dedup and profit/confidence filtering before emission
//!
//! The decoded feed, execution and persistence are external collaborators;
//! this binary wires the engine to an in-process channel pair.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mevscan_core::{
    init_config, ArbitrageDetector, EngineConfig, EngineMetrics, LiquidationMonitor,
    Orchestrator, SandwichDetector, Scorer,
};
use mevscan_feed::{ChannelEventSource, FeedHandle, LogSink, StaticGasOracle};
use mevscan_state::WorldStateStore;

/// Environment variable names.
mod env {
    pub const PROFILE: &str = "MEVSCAN_PROFILE";
    pub const CONFIG: &str = "MEVSCAN_CONFIG";
    pub const GAS_PRICE_GWEI: &str = "MEVSCAN_GAS_PRICE_GWEI";
    pub const NATIVE_USD: &str = "MEVSCAN_NATIVE_USD";
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,mevscan_core=debug,mevscan_state=debug")),
        )
        .init();

    // Engine config must be initialized before any core module reads it.
    // MEVSCAN_PROFILE selects default/aggressive/conservative;
    // MEVSCAN_CONFIG points at a TOML file.
    let engine_config = EngineConfig::from_env();
    engine_config.log_config();
    init_config(engine_config.clone());

    info!("Starting mevscan detection engine");

    let (feed, metrics) = initialize_components(&engine_config).await?;

    // The feed handle is where the ingestion collaborator plugs in; nothing
    // produces events in a bare local run, so this idles until wired up.
    run_health_loop(feed, metrics).await;

    Ok(())
}

async fn initialize_components(
    config: &EngineConfig,
) -> Result<(FeedHandle, Arc<EngineMetrics>)> {
    info!("Initializing components...");

    // Gas oracle (static quote; the fee-history tracker updates it upstream)
    let gas_price_gwei: u128 = std::env::var(env::GAS_PRICE_GWEI)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(20);
    let native_usd: f64 = std::env::var(env::NATIVE_USD)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(2_500.0);
    let gas = Arc::new(StaticGasOracle::new(gas_price_gwei * 1_000_000_000, native_usd));
    info!(gas_price_gwei, native_usd, "Gas oracle initialized");

    // World state store
    let store = Arc::new(WorldStateStore::with_retention(
        config.orchestrator.version_retention,
    ));

    // Metrics
    let metrics = Arc::new(EngineMetrics::new());

    // Detectors
    let arbitrage = Arc::new(ArbitrageDetector::new(config.arbitrage.clone(), gas.clone()));
    let liquidation = Arc::new(LiquidationMonitor::new(
        config.liquidation.clone(),
        gas.clone(),
    ));
    let sandwich = Arc::new(SandwichDetector::new(config.sandwich.clone(), gas));
    info!("Detectors initialized");

    // Scorer and its intake channel
    let scorer = Arc::new(Scorer::new(config.scoring.clone(), metrics.clone()));
    let (intake_tx, intake_rx) = tokio::sync::mpsc::channel(config.scoring.intake_capacity);

    // Opportunity sink (structured-log sink by default; swap for a bus)
    let sink = Arc::new(LogSink);
    tokio::spawn(scorer.clone().run(intake_rx, sink));

    // Event source
    let (feed, source) = ChannelEventSource::new(config.orchestrator.event_capacity);

    // Orchestrator
    let orchestrator = Orchestrator::new(
        store,
        arbitrage,
        liquidation,
        sandwich,
        scorer,
        intake_tx,
        metrics.clone(),
        config.orchestrator.clone(),
    );
    tokio::spawn(async move {
        orchestrator.run(source).await;
    });

    info!("All components initialized");
    Ok((feed, metrics))
}

/// Keep the process alive and periodically surface the health signal until
/// ctrl-c. An external monitor would scrape the same snapshot.
async fn run_health_loop(_feed: FeedHandle, metrics: Arc<EngineMetrics>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(30));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snap = metrics.snapshot();
                info!(
                    events = snap.events_ingested,
                    emitted = snap.opportunities_emitted,
                    suppressed = snap.opportunities_suppressed,
                    timeouts = snap.detector_timeouts,
                    reject_ratio = snap.reject_ratio(),
                    "engine health"
                );
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }
}

/// Print startup banner.
fn print_banner() {
    println!(
        r#"
    ┌┬┐┌─┐┬  ┬┌─┐┌─┐┌─┐┌┐┌
    │││├┤ └┐┌┘└─┐│  ├─┤│││
    ┴ ┴└─┘ └┘ └─┘└─┘┴ ┴┘└┘
    MEV Detection Engine v0.1.0
    "#
    );
}
