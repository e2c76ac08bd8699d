//! Emitted opportunity record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::events::BlockId;

/// Kind of extractable value an opportunity represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityKind {
    Arbitrage,
    Liquidation,
    Sandwich,
}

impl OpportunityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Arbitrage => "arbitrage",
            Self::Liquidation => "liquidation",
            Self::Sandwich => "sandwich",
        }
    }
}

/// A scored, deduplicated MEV opportunity, ready for the external sink.
///
/// `involved` holds the canonical hex identifiers of the transactions and
/// pools a taker would touch, in execution order; the dedup key is derived
/// from their sorted set, so the same underlying opportunity found twice
/// hashes identically regardless of discovery order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MEVOpportunity {
    pub id: String,
    pub kind: OpportunityKind,
    pub protocols: SmallVec<[String; 2]>,
    pub involved: SmallVec<[String; 4]>,
    pub gross_profit_usd: f64,
    pub gas_cost_usd: f64,
    pub net_profit_usd: f64,
    pub confidence: f64,
    pub detected_at: DateTime<Utc>,
    pub source_block: BlockId,
    pub dedup_key: String,
}

impl MEVOpportunity {
    /// Canonical dedup key: kind + sorted involved identifiers.
    pub fn dedup_key_for(kind: OpportunityKind, involved: &[String]) -> String {
        let mut ids: Vec<&str> = involved.iter().map(String::as_str).collect();
        ids.sort_unstable();
        ids.dedup();
        let mut key = String::with_capacity(16 + ids.len() * 44);
        key.push_str(kind.as_str());
        for id in ids {
            key.push(':');
            key.push_str(id);
        }
        key
    }
}
