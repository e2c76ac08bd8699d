//! Engine configuration with profile support.
//!
//! Centralizes every tunable of the detection pipeline: detector thresholds,
//! scoring filters, dedup windows, deadlines and channel capacities.
//! Profiles trade false-positive rate against coverage; the exact numbers are
//! product defaults, not algorithmic contracts.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure for the detection engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Arbitrage detector parameters
    #[serde(default)]
    pub arbitrage: ArbitrageConfig,

    /// Liquidation monitor parameters
    #[serde(default)]
    pub liquidation: LiquidationConfig,

    /// Sandwich detector parameters
    #[serde(default)]
    pub sandwich: SandwichConfig,

    /// Scoring, filtering and dedup parameters
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Orchestration timing and capacities
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

fn default_profile_name() -> String {
    "default".to_string()
}

/// Arbitrage detector parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrageConfig {
    /// Maximum cycle length in pool hops (2-4 is practical)
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,

    /// Capital committed to cycle simulation, in USD
    #[serde(default = "default_probe_capital")]
    pub probe_capital_usd: f64,

    /// Gas units burned per swap hop
    #[serde(default = "default_gas_per_hop")]
    pub gas_per_hop: u64,

    /// Confidence penalty per hop beyond the first two
    #[serde(default = "default_hop_confidence_penalty")]
    pub hop_confidence_penalty: f64,

    /// Negative log-rate threshold below which a cycle is worth simulating
    #[serde(default = "default_cycle_epsilon")]
    pub cycle_epsilon: f64,
}

fn default_max_hops() -> usize {
    3
}
fn default_probe_capital() -> f64 {
    5_000.0
}
fn default_gas_per_hop() -> u64 {
    120_000
}
fn default_hop_confidence_penalty() -> f64 {
    0.15
}
fn default_cycle_epsilon() -> f64 {
    1e-9
}

impl Default for ArbitrageConfig {
    fn default() -> Self {
        Self {
            max_hops: default_max_hops(),
            probe_capital_usd: default_probe_capital(),
            gas_per_hop: default_gas_per_hop(),
            hop_confidence_penalty: default_hop_confidence_penalty(),
            cycle_epsilon: default_cycle_epsilon(),
        }
    }
}

/// Liquidation monitor parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationConfig {
    /// Liquidation bonus in basis points (protocol default when the feed
    /// does not carry one)
    #[serde(default = "default_bonus_bps")]
    pub bonus_bps: u16,

    /// Fraction of the debt closable in one liquidation call
    #[serde(default = "default_close_factor")]
    pub close_factor: f64,

    /// Gas units for one liquidation call
    #[serde(default = "default_liquidation_gas")]
    pub gas_units: u64,

    /// Minimum collateral USD to consider (filter dust positions)
    #[serde(default = "default_dust_threshold")]
    pub dust_threshold_usd: f64,

    /// Relative change in seizable value required to re-emit an already
    /// liquidatable position
    #[serde(default = "default_reemit_delta")]
    pub reemit_delta_pct: f64,

    /// Price age beyond which a position is not evaluated (milliseconds)
    #[serde(default = "default_price_staleness")]
    pub price_staleness_ms: u64,

    /// Price drift beyond which cached sensitivities are recomputed (percent)
    #[serde(default = "default_sensitivity_drift")]
    pub sensitivity_drift_pct: f64,
}

fn default_bonus_bps() -> u16 {
    500
}
fn default_close_factor() -> f64 {
    0.5
}
fn default_liquidation_gas() -> u64 {
    450_000
}
fn default_dust_threshold() -> f64 {
    10.0
}
fn default_reemit_delta() -> f64 {
    5.0
}
fn default_price_staleness() -> u64 {
    30_000
}
fn default_sensitivity_drift() -> f64 {
    0.5
}

impl Default for LiquidationConfig {
    fn default() -> Self {
        Self {
            bonus_bps: default_bonus_bps(),
            close_factor: default_close_factor(),
            gas_units: default_liquidation_gas(),
            dust_threshold_usd: default_dust_threshold(),
            reemit_delta_pct: default_reemit_delta(),
            price_staleness_ms: default_price_staleness(),
            sensitivity_drift_pct: default_sensitivity_drift(),
        }
    }
}

impl LiquidationConfig {
    pub fn price_staleness(&self) -> Duration {
        Duration::from_millis(self.price_staleness_ms)
    }
}

/// Sandwich detector parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandwichConfig {
    /// Maximum capital committed to the front-run leg, in USD
    #[serde(default = "default_capital_cap")]
    pub capital_cap_usd: f64,

    /// Gas units for one attacker swap (two are needed)
    #[serde(default = "default_sandwich_gas")]
    pub gas_per_swap: u64,

    /// Pending transaction TTL (seconds)
    #[serde(default = "default_pending_ttl")]
    pub pending_ttl_secs: u64,

    /// Observed gas prices kept per pool for the competition heuristic
    #[serde(default = "default_gas_history")]
    pub gas_history_depth: usize,

    /// Weight of the competition penalty in the confidence score
    #[serde(default = "default_competition_weight")]
    pub competition_weight: f64,
}

fn default_capital_cap() -> f64 {
    50_000.0
}
fn default_sandwich_gas() -> u64 {
    160_000
}
fn default_pending_ttl() -> u64 {
    30
}
fn default_gas_history() -> usize {
    256
}
fn default_competition_weight() -> f64 {
    0.6
}

impl Default for SandwichConfig {
    fn default() -> Self {
        Self {
            capital_cap_usd: default_capital_cap(),
            gas_per_swap: default_sandwich_gas(),
            pending_ttl_secs: default_pending_ttl(),
            gas_history_depth: default_gas_history(),
            competition_weight: default_competition_weight(),
        }
    }
}

impl SandwichConfig {
    pub fn pending_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_ttl_secs)
    }
}

/// Scoring, filtering and deduplication parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Minimum net profit (gross − gas) to emit, in USD
    #[serde(default = "default_min_net_profit")]
    pub min_net_profit_usd: f64,

    /// Minimum confidence to emit
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    /// Maximum snapshot age at scoring time (milliseconds)
    #[serde(default = "default_max_snapshot_age")]
    pub max_snapshot_age_ms: u64,

    /// Dedup window in seconds (roughly a few blocks)
    #[serde(default = "default_dedup_window")]
    pub dedup_window_secs: u64,

    /// Net-profit improvement required to re-emit inside the window (percent)
    #[serde(default = "default_scoring_reemit_delta")]
    pub reemit_delta_pct: f64,

    /// Bounded intake capacity between detectors and the scorer
    #[serde(default = "default_intake_capacity")]
    pub intake_capacity: usize,
}

fn default_min_net_profit() -> f64 {
    25.0
}
fn default_min_confidence() -> f64 {
    0.3
}
fn default_max_snapshot_age() -> u64 {
    2_000
}
fn default_dedup_window() -> u64 {
    36
}
fn default_scoring_reemit_delta() -> f64 {
    10.0
}
fn default_intake_capacity() -> usize {
    512
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            min_net_profit_usd: default_min_net_profit(),
            min_confidence: default_min_confidence(),
            max_snapshot_age_ms: default_max_snapshot_age(),
            dedup_window_secs: default_dedup_window(),
            reemit_delta_pct: default_scoring_reemit_delta(),
            intake_capacity: default_intake_capacity(),
        }
    }
}

impl ScoringConfig {
    pub fn dedup_window(&self) -> Duration {
        Duration::from_secs(self.dedup_window_secs)
    }
    pub fn max_snapshot_age(&self) -> Duration {
        Duration::from_millis(self.max_snapshot_age_ms)
    }
}

/// Orchestration timing and capacities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Per-event detection deadline (milliseconds)
    #[serde(default = "default_event_deadline")]
    pub event_deadline_ms: u64,

    /// Housekeeping sweep interval (milliseconds)
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: u64,

    /// Versions retained per world-state key for rollback
    #[serde(default = "default_version_retention")]
    pub version_retention: usize,

    /// Inbound event channel capacity
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_event_deadline() -> u64 {
    250
}
fn default_sweep_interval() -> u64 {
    1_000
}
fn default_version_retention() -> usize {
    8
}
fn default_event_capacity() -> usize {
    1_024
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            event_deadline_ms: default_event_deadline(),
            sweep_interval_ms: default_sweep_interval(),
            version_retention: default_version_retention(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl OrchestratorConfig {
    pub fn event_deadline(&self) -> Duration {
        Duration::from_millis(self.event_deadline_ms)
    }
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            arbitrage: ArbitrageConfig::default(),
            liquidation: LiquidationConfig::default(),
            sandwich: SandwichConfig::default(),
            scoring: ScoringConfig::default(),
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Aggressive profile: lower thresholds, tighter deadlines. Emits more,
    /// earlier, at the cost of more marginal records.
    pub fn aggressive() -> Self {
        Self {
            profile: "aggressive".to_string(),
            arbitrage: ArbitrageConfig {
                max_hops: 4,
                probe_capital_usd: 10_000.0,
                ..Default::default()
            },
            liquidation: LiquidationConfig {
                dust_threshold_usd: 1.0,
                reemit_delta_pct: 2.0,
                ..Default::default()
            },
            sandwich: SandwichConfig {
                capital_cap_usd: 100_000.0,
                ..Default::default()
            },
            scoring: ScoringConfig {
                min_net_profit_usd: 5.0,
                min_confidence: 0.15,
                reemit_delta_pct: 5.0,
                ..Default::default()
            },
            orchestrator: OrchestratorConfig {
                event_deadline_ms: 150,
                ..Default::default()
            },
        }
    }

    /// Conservative profile: only high-value, high-confidence records.
    pub fn conservative() -> Self {
        Self {
            profile: "conservative".to_string(),
            arbitrage: ArbitrageConfig {
                max_hops: 2,
                ..Default::default()
            },
            liquidation: LiquidationConfig {
                dust_threshold_usd: 100.0,
                ..Default::default()
            },
            sandwich: SandwichConfig {
                capital_cap_usd: 20_000.0,
                ..Default::default()
            },
            scoring: ScoringConfig {
                min_net_profit_usd: 100.0,
                min_confidence: 0.6,
                ..Default::default()
            },
            orchestrator: OrchestratorConfig::default(),
        }
    }

    /// Select a profile from `MEVSCAN_PROFILE`, or load a TOML file from
    /// `MEVSCAN_CONFIG` if set. Unknown values fall back to the default.
    pub fn from_env() -> Self {
        if let Ok(path) = std::env::var("MEVSCAN_CONFIG") {
            match Self::from_file(&path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "failed to load config file, using profile defaults");
                }
            }
        }
        let profile = std::env::var("MEVSCAN_PROFILE").unwrap_or_else(|_| "default".to_string());
        match profile.to_lowercase().as_str() {
            "aggressive" | "aggro" => Self::aggressive(),
            "conservative" | "safe" => Self::conservative(),
            _ => Self::default(),
        }
    }

    /// Log the effective configuration.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, "Engine configuration loaded");
        tracing::info!(
            max_hops = self.arbitrage.max_hops,
            probe_capital = self.arbitrage.probe_capital_usd,
            "Arbitrage parameters"
        );
        tracing::info!(
            bonus_bps = self.liquidation.bonus_bps,
            dust_threshold = self.liquidation.dust_threshold_usd,
            staleness_ms = self.liquidation.price_staleness_ms,
            "Liquidation parameters"
        );
        tracing::info!(
            capital_cap = self.sandwich.capital_cap_usd,
            pending_ttl_secs = self.sandwich.pending_ttl_secs,
            "Sandwich parameters"
        );
        tracing::info!(
            min_net_profit = self.scoring.min_net_profit_usd,
            min_confidence = self.scoring.min_confidence,
            dedup_window_secs = self.scoring.dedup_window_secs,
            "Scoring thresholds"
        );
        tracing::info!(
            event_deadline_ms = self.orchestrator.event_deadline_ms,
            "Orchestrator timing"
        );
    }
}

/// Global configuration holder using lazy initialization.
use std::sync::OnceLock;

static GLOBAL_CONFIG: OnceLock<EngineConfig> = OnceLock::new();

/// Initialize global configuration.
pub fn init_config(config: EngineConfig) {
    let _ = GLOBAL_CONFIG.set(config);
}

/// Get the global configuration, initializing from environment if needed.
pub fn config() -> &'static EngineConfig {
    GLOBAL_CONFIG.get_or_init(EngineConfig::from_env)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.arbitrage.max_hops, 3);
        assert_eq!(config.scoring.min_net_profit_usd, 25.0);
    }

    #[test]
    fn test_aggressive_profile() {
        let config = EngineConfig::aggressive();
        assert_eq!(config.profile, "aggressive");
        assert!(config.scoring.min_net_profit_usd < EngineConfig::default().scoring.min_net_profit_usd);
        assert_eq!(config.arbitrage.max_hops, 4);
    }

    #[test]
    fn test_conservative_profile() {
        let config = EngineConfig::conservative();
        assert_eq!(config.profile, "conservative");
        assert!(config.scoring.min_confidence > EngineConfig::default().scoring.min_confidence);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = EngineConfig::aggressive();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("profile = \"aggressive\""));

        let parsed: EngineConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.profile, "aggressive");
        assert_eq!(parsed.arbitrage.max_hops, 4);
    }
}
