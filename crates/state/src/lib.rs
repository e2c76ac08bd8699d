//! Chain-shaped state layer for the MEV detection engine.
//!
//! This crate provides:
//! - Block identity and the inbound event schema (decoded by an upstream feed)
//! - Entity types: tokens, pools, lending positions, pending transactions
//! - The AMM pricing capability (constant-product, stable-swap, concentrated)
//! - The versioned, reorg-safe World State Store with point-in-time snapshots
//! - The emitted opportunity record shape
//!
//! Ingestion, decoding and persistence live outside this workspace; everything
//! here operates on already-decoded events.

mod amm;
mod error;
mod events;
mod opportunity;
mod pool;
mod position;
mod store;

pub use amm::{pricing_for, PoolPricing, SwapLeg};
pub use error::StateError;
pub use events::{
    BlockId, DecodedSwap, EventKind, InboundEvent, PositionLegUpdate, ReserveUpdate,
};
pub use opportunity::{MEVOpportunity, OpportunityKind};
pub use pool::{Pool, PoolKind, Token};
pub use position::{CollateralLeg, DebtLeg, Position, PositionId};
pub use store::{ApplyOutcome, PendingTransaction, Snapshot, StoreStats, TokenPrice, WorldStateStore};
