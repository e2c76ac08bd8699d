//! Inbound event schema.
//!
//! Events arrive already decoded from an external feed (RPC / mempool
//! ingestion is out of scope). The orchestrator applies every event to the
//! World State Store first, then fans it out to the subscribed detectors.

use alloy::primitives::{Address, B256, I256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::position::PositionId;

/// Block identity used for versioning and reorg safety.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId {
    pub height: u64,
    pub hash: B256,
}

impl BlockId {
    pub fn new(height: u64, hash: B256) -> Self {
        Self { height, hash }
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} ({})", self.height, self.hash)
    }
}

/// Decoded swap intent carried by a pending transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodedSwap {
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    /// Victim's slippage floor; a front-run that pushes the victim's output
    /// below this would make the victim revert.
    pub min_amount_out: U256,
}

/// Reserve payload of a pool update.
///
/// Feeds that track full pool state send absolute reserves; feeds that decode
/// individual swap/mint/burn events send signed deltas. A delta that would
/// drive a reserve negative is a decode inconsistency and is rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ReserveUpdate {
    Absolute(SmallVec<[U256; 2]>),
    Delta(SmallVec<[I256; 2]>),
}

/// One collateral or debt leg of a position update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionLegUpdate {
    pub asset: Address,
    pub amount: U256,
    pub decimals: u8,
    /// Liquidation threshold in basis points; only meaningful on collateral.
    pub liquidation_threshold_bps: u16,
}

/// Event kinds, used as keys of the orchestrator's subscription table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    PriceOrReserveUpdate,
    PendingTransactionSeen,
    PositionChanged,
    TransactionConfirmed,
    ReorgNotice,
}

/// A decoded inbound event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InboundEvent {
    /// Confirmed reserve change and/or oracle price ticks at a block.
    /// Either list may be empty; a pure price tick carries no reserves.
    PriceOrReserveUpdate {
        pool_id: Address,
        block: BlockId,
        reserves: Option<ReserveUpdate>,
        token_prices: SmallVec<[(Address, U256); 2]>,
        timestamp: DateTime<Utc>,
    },

    /// A swap observed in the mempool, not yet confirmed.
    PendingTransactionSeen {
        tx_id: B256,
        sender: Address,
        target: Address,
        swap: DecodedSwap,
        gas_price_wei: u128,
        observed_at: DateTime<Utc>,
    },

    /// Collateral/debt change on a lending position.
    PositionChanged {
        position_id: PositionId,
        owner: Address,
        protocol: String,
        collateral: SmallVec<[PositionLegUpdate; 4]>,
        debt: SmallVec<[PositionLegUpdate; 4]>,
        block: BlockId,
    },

    /// A previously pending transaction landed on chain.
    TransactionConfirmed { tx_id: B256, block_height: u64 },

    /// Chain reorganization below the common ancestor.
    ReorgNotice {
        common_ancestor_height: u64,
        common_ancestor_hash: B256,
    },
}

impl InboundEvent {
    /// Kind of this event, for subscription routing.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::PriceOrReserveUpdate { .. } => EventKind::PriceOrReserveUpdate,
            Self::PendingTransactionSeen { .. } => EventKind::PendingTransactionSeen,
            Self::PositionChanged { .. } => EventKind::PositionChanged,
            Self::TransactionConfirmed { .. } => EventKind::TransactionConfirmed,
            Self::ReorgNotice { .. } => EventKind::ReorgNotice,
        }
    }

    /// Block height the event is anchored to, if any.
    pub fn block_height(&self) -> Option<u64> {
        match self {
            Self::PriceOrReserveUpdate { block, .. } => Some(block.height),
            Self::PositionChanged { block, .. } => Some(block.height),
            Self::TransactionConfirmed { block_height, .. } => Some(*block_height),
            Self::ReorgNotice {
                common_ancestor_height,
                ..
            } => Some(*common_ancestor_height),
            Self::PendingTransactionSeen { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_routing() {
        let ev = InboundEvent::ReorgNotice {
            common_ancestor_height: 100,
            common_ancestor_hash: B256::ZERO,
        };
        assert_eq!(ev.kind(), EventKind::ReorgNotice);
        assert_eq!(ev.block_height(), Some(100));

        let ev = InboundEvent::PendingTransactionSeen {
            tx_id: B256::ZERO,
            sender: Address::ZERO,
            target: Address::ZERO,
            swap: DecodedSwap {
                token_in: Address::ZERO,
                token_out: Address::ZERO,
                amount_in: U256::from(1u64),
                min_amount_out: U256::ZERO,
            },
            gas_price_wei: 0,
            observed_at: Utc::now(),
        };
        assert_eq!(ev.kind(), EventKind::PendingTransactionSeen);
        assert_eq!(ev.block_height(), None);
    }
}
