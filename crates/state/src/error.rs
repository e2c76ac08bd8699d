//! Error taxonomy for the state layer.

use alloy::primitives::Address;
use thiserror::Error;

/// Errors surfaced by the World State Store and the AMM pricing capability.
///
/// None of these are fatal: stale and malformed updates are dropped and
/// counted, pricing faults are isolated to the detector invocation that
/// triggered them.
#[derive(Debug, Error)]
pub enum StateError {
    /// Update height is not newer than the committed height for the key.
    #[error("stale update for {key} at height {height} (committed {committed})")]
    StaleUpdate {
        key: String,
        height: u64,
        committed: u64,
    },

    /// Applying a reserve delta would drive a reserve below zero.
    #[error("negative reserve for pool {pool} at index {index}")]
    NegativeReserve { pool: Address, index: usize },

    /// Event payload is inconsistent with the entity it targets.
    #[error("decode inconsistency: {0}")]
    DecodeInconsistency(String),

    /// Entity referenced by the event is not known to the store.
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    /// A rollback is in progress; the update must be replayed by the feed.
    #[error("rollback in progress below height {below}")]
    RollbackInProgress { below: u64 },

    /// Pricing math hit an empty pool side.
    #[error("zero reserve in pool {pool}")]
    ZeroReserve { pool: Address },

    /// Swap legs reference a token the pool does not carry.
    #[error("token {token} not in pool {pool}")]
    TokenNotInPool { pool: Address, token: Address },
}
