//! Versioned, reorg-safe World State Store.
//!
//! Every entity (pool, position, oracle price) keeps a short chain of
//! versions tagged by block height. Writers mutate one key at a time through
//! the sharded map entry, so writes to different keys never contend; readers
//! take point-in-time snapshots that resolve each key to "latest version at
//! or below the snapshot height" without blocking writers.
//!
//! A reorg pauses intake, discards every version above the common ancestor,
//! bumps the store epoch and resumes. Snapshots carry the epoch they were
//! built under, so in-flight detector work on orphaned state can be told
//! apart downstream.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use alloy::primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::error::StateError;
use crate::events::{BlockId, DecodedSwap, InboundEvent, PositionLegUpdate, ReserveUpdate};
use crate::pool::Pool;
use crate::position::{CollateralLeg, DebtLeg, Position, PositionId};

/// Default number of versions retained per key for rollback.
const DEFAULT_RETENTION: usize = 8;

/// Oracle price for one asset (8-decimal fixed point).
#[derive(Debug, Clone, Copy)]
pub struct TokenPrice {
    pub price: U256,
    pub block_height: u64,
    /// Feed timestamp of the underlying observation.
    pub timestamp: DateTime<Utc>,
    /// When this process saw the price; staleness is measured against this.
    pub seen: Instant,
}

impl TokenPrice {
    /// Age of the price as seen by this process.
    pub fn age(&self) -> std::time::Duration {
        self.seen.elapsed()
    }
}

/// A mempool transaction awaiting confirmation.
#[derive(Debug, Clone)]
pub struct PendingTransaction {
    pub tx_id: B256,
    pub sender: Address,
    pub target: Address,
    pub swap: DecodedSwap,
    pub gas_price_wei: u128,
    pub observed_at: DateTime<Utc>,
    pub seen: Instant,
}

/// Short per-key version chain, ascending by height.
type Versions<T> = SmallVec<[(u64, Arc<T>); 4]>;

fn latest_at<T>(versions: &Versions<T>, height: u64) -> Option<Arc<T>> {
    versions
        .iter()
        .rev()
        .find(|(h, _)| *h <= height)
        .map(|(_, v)| v.clone())
}

fn committed_height<T>(versions: &Versions<T>) -> Option<u64> {
    versions.last().map(|(h, _)| *h)
}

/// What an `apply_update` call actually changed.
#[derive(Debug, Default, Clone, Copy)]
pub struct ApplyOutcome {
    pub pools_updated: usize,
    pub prices_updated: usize,
    pub positions_updated: usize,
}

impl ApplyOutcome {
    pub fn is_empty(&self) -> bool {
        self.pools_updated == 0 && self.prices_updated == 0 && self.positions_updated == 0
    }
}

/// Store statistics, surfaced as a health signal.
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub pools: usize,
    pub positions: usize,
    pub priced_assets: usize,
    pub committed_height: u64,
    pub epoch: u64,
    pub stale_rejects: u64,
    pub decode_rejects: u64,
    pub rollbacks: u64,
}

/// The versioned world state.
pub struct WorldStateStore {
    pools: DashMap<Address, Versions<Pool>>,
    positions: DashMap<PositionId, Versions<Position>>,
    prices: DashMap<Address, Versions<TokenPrice>>,

    /// Reverse index: token → pools that carry it.
    pools_by_token: DashMap<Address, DashSet<Address>>,
    /// Reverse index: asset → positions exposed to it (either side).
    positions_by_asset: DashMap<Address, DashSet<PositionId>>,

    committed_block: RwLock<Option<BlockId>>,
    committed_height: AtomicU64,
    /// Bumped on every rollback; snapshots carry the epoch they saw.
    epoch: AtomicU64,
    rolling_back: AtomicBool,
    retention: usize,

    stale_rejects: AtomicU64,
    decode_rejects: AtomicU64,
    rollbacks: AtomicU64,
}

impl WorldStateStore {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    /// `retention` bounds the number of versions kept per key; deeper
    /// retention tolerates deeper reorgs at the cost of memory.
    pub fn with_retention(retention: usize) -> Self {
        Self {
            pools: DashMap::new(),
            positions: DashMap::new(),
            prices: DashMap::new(),
            pools_by_token: DashMap::new(),
            positions_by_asset: DashMap::new(),
            committed_block: RwLock::new(None),
            committed_height: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
            rolling_back: AtomicBool::new(false),
            retention: retention.max(1),
            stale_rejects: AtomicU64::new(0),
            decode_rejects: AtomicU64::new(0),
            rollbacks: AtomicU64::new(0),
        }
    }

    /// Seed a pool before its first reserve update (bootstrap path).
    pub fn register_pool(&self, pool: Pool, block: BlockId) {
        for token in &pool.tokens {
            self.pools_by_token
                .entry(token.address)
                .or_default()
                .insert(pool.id);
        }
        let mut entry = self.pools.entry(pool.id).or_default();
        match committed_height(&entry) {
            Some(committed) if committed >= block.height => {}
            _ => entry.push((block.height, Arc::new(pool))),
        }
    }

    /// Apply a state-bearing event. Per-key height monotonicity is enforced:
    /// an update at or below a key's committed height is rejected as stale
    /// and counted, never applied silently.
    pub fn apply_update(&self, event: &InboundEvent) -> Result<ApplyOutcome, StateError> {
        if self.rolling_back.load(Ordering::Acquire) {
            return Err(StateError::RollbackInProgress {
                below: self.committed_height.load(Ordering::Acquire),
            });
        }

        match event {
            InboundEvent::PriceOrReserveUpdate {
                pool_id,
                block,
                reserves,
                token_prices,
                timestamp,
            } => self.apply_pool_update(*pool_id, *block, reserves.as_ref(), token_prices, *timestamp),
            InboundEvent::PositionChanged {
                position_id,
                owner,
                protocol,
                collateral,
                debt,
                block,
            } => self.apply_position_update(*position_id, *owner, protocol, collateral, debt, *block),
            // Pending-tx lifecycle and reorgs are handled by the orchestrator.
            _ => Ok(ApplyOutcome::default()),
        }
    }

    fn apply_pool_update(
        &self,
        pool_id: Address,
        block: BlockId,
        reserves: Option<&ReserveUpdate>,
        token_prices: &[(Address, U256)],
        timestamp: DateTime<Utc>,
    ) -> Result<ApplyOutcome, StateError> {
        let mut outcome = ApplyOutcome::default();
        let mut first_stale: Option<StateError> = None;

        if let Some(update) = reserves {
            match self.apply_reserves(pool_id, block, update) {
                Ok(()) => outcome.pools_updated += 1,
                Err(e @ StateError::StaleUpdate { .. }) => {
                    self.stale_rejects.fetch_add(1, Ordering::Relaxed);
                    first_stale.get_or_insert(e);
                }
                Err(e) => {
                    self.decode_rejects.fetch_add(1, Ordering::Relaxed);
                    return Err(e);
                }
            }
        }

        for (asset, price) in token_prices {
            if price.is_zero() {
                self.decode_rejects.fetch_add(1, Ordering::Relaxed);
                warn!(asset = %asset, "zero price tick dropped");
                continue;
            }
            let mut entry = self.prices.entry(*asset).or_default();
            match committed_height(&entry) {
                Some(committed) if committed >= block.height => {
                    self.stale_rejects.fetch_add(1, Ordering::Relaxed);
                    first_stale.get_or_insert(StateError::StaleUpdate {
                        key: format!("price:{asset}"),
                        height: block.height,
                        committed,
                    });
                }
                _ => {
                    entry.push((
                        block.height,
                        Arc::new(TokenPrice {
                            price: *price,
                            block_height: block.height,
                            timestamp,
                            seen: Instant::now(),
                        }),
                    ));
                    prune(&mut entry, self.retention);
                    outcome.prices_updated += 1;
                }
            }
        }

        if outcome.is_empty() {
            if let Some(stale) = first_stale {
                return Err(stale);
            }
        }

        self.commit_block(block);
        Ok(outcome)
    }

    fn apply_reserves(
        &self,
        pool_id: Address,
        block: BlockId,
        update: &ReserveUpdate,
    ) -> Result<(), StateError> {
        let mut entry = self
            .pools
            .get_mut(&pool_id)
            .ok_or_else(|| StateError::UnknownEntity(format!("pool {pool_id}")))?;

        if let Some(committed) = committed_height(&entry) {
            if committed >= block.height {
                return Err(StateError::StaleUpdate {
                    key: format!("pool:{pool_id}"),
                    height: block.height,
                    committed,
                });
            }
        }

        let current = entry
            .last()
            .map(|(_, p)| p.clone())
            .ok_or_else(|| StateError::UnknownEntity(format!("pool {pool_id}")))?;

        let new_reserves: SmallVec<[U256; 2]> = match update {
            ReserveUpdate::Absolute(values) => {
                if values.len() != current.tokens.len() {
                    return Err(StateError::DecodeInconsistency(format!(
                        "pool {pool_id}: {} reserves for {} tokens",
                        values.len(),
                        current.tokens.len()
                    )));
                }
                values.clone()
            }
            ReserveUpdate::Delta(deltas) => {
                if deltas.len() != current.tokens.len() {
                    return Err(StateError::DecodeInconsistency(format!(
                        "pool {pool_id}: {} deltas for {} tokens",
                        deltas.len(),
                        current.tokens.len()
                    )));
                }
                let mut next = current.reserves.clone();
                for (index, delta) in deltas.iter().enumerate() {
                    if delta.is_negative() {
                        let magnitude = delta.unsigned_abs();
                        if magnitude > next[index] {
                            return Err(StateError::NegativeReserve {
                                pool: pool_id,
                                index,
                            });
                        }
                        next[index] -= magnitude;
                    } else {
                        next[index] = next[index].saturating_add(delta.unsigned_abs());
                    }
                }
                next
            }
        };

        let mut next_pool = (*current).clone();
        next_pool.reserves = new_reserves;
        entry.push((block.height, Arc::new(next_pool)));
        prune(&mut entry, self.retention);
        Ok(())
    }

    fn apply_position_update(
        &self,
        position_id: PositionId,
        owner: Address,
        protocol: &str,
        collateral: &[PositionLegUpdate],
        debt: &[PositionLegUpdate],
        block: BlockId,
    ) -> Result<ApplyOutcome, StateError> {
        let mut entry = self.positions.entry(position_id).or_default();

        if let Some(committed) = committed_height(&entry) {
            if committed >= block.height {
                self.stale_rejects.fetch_add(1, Ordering::Relaxed);
                return Err(StateError::StaleUpdate {
                    key: format!("position:{position_id}"),
                    height: block.height,
                    committed,
                });
            }
        }

        let position = Position {
            id: position_id,
            owner,
            protocol: protocol.to_string(),
            collaterals: collateral
                .iter()
                .map(|leg| CollateralLeg {
                    asset: leg.asset,
                    amount: leg.amount,
                    decimals: leg.decimals,
                    liquidation_threshold_bps: leg.liquidation_threshold_bps,
                })
                .collect(),
            debts: debt
                .iter()
                .map(|leg| DebtLeg {
                    asset: leg.asset,
                    amount: leg.amount,
                    decimals: leg.decimals,
                })
                .collect(),
        };

        for asset in position.exposed_assets() {
            self.positions_by_asset
                .entry(asset)
                .or_default()
                .insert(position_id);
        }

        entry.push((block.height, Arc::new(position)));
        prune(&mut entry, self.retention);
        drop(entry);

        self.commit_block(block);
        Ok(ApplyOutcome {
            positions_updated: 1,
            ..Default::default()
        })
    }

    fn commit_block(&self, block: BlockId) {
        let mut highest = self.committed_height.load(Ordering::Acquire);
        while block.height > highest {
            match self.committed_height.compare_exchange_weak(
                highest,
                block.height,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    *self.committed_block.write() = Some(block);
                    break;
                }
                Err(actual) => highest = actual,
            }
        }
    }

    /// Immutable point-in-time view at the latest committed height.
    pub fn snapshot(self: &Arc<Self>) -> Snapshot {
        self.snapshot_at(self.committed_height.load(Ordering::Acquire))
    }

    /// Immutable view resolving every key to its latest version ≤ `height`.
    pub fn snapshot_at(self: &Arc<Self>, height: u64) -> Snapshot {
        Snapshot {
            store: Arc::clone(self),
            height,
            epoch: self.epoch.load(Ordering::Acquire),
        }
    }

    /// Discard all versions above `to_height`. Intake is paused for the
    /// duration so concurrent writes cannot race the rollback.
    pub fn rollback(&self, to_height: u64) -> usize {
        self.rolling_back.store(true, Ordering::Release);
        let mut discarded = 0usize;

        for mut entry in self.pools.iter_mut() {
            let before = entry.len();
            entry.retain(|(h, _)| *h <= to_height);
            discarded += before - entry.len();
        }
        for mut entry in self.positions.iter_mut() {
            let before = entry.len();
            entry.retain(|(h, _)| *h <= to_height);
            discarded += before - entry.len();
        }
        for mut entry in self.prices.iter_mut() {
            let before = entry.len();
            entry.retain(|(h, _)| *h <= to_height);
            discarded += before - entry.len();
        }

        let current = self.committed_height.load(Ordering::Acquire);
        if current > to_height {
            self.committed_height.store(to_height, Ordering::Release);
            *self.committed_block.write() = None;
        }

        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
        self.rolling_back.store(false, Ordering::Release);

        debug!(to_height, discarded, "world state rolled back");
        discarded
    }

    /// Current store epoch; bumped on every rollback.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Highest committed block height.
    pub fn height(&self) -> u64 {
        self.committed_height.load(Ordering::Acquire)
    }

    /// Latest committed block identity, if any update has been applied.
    pub fn committed_block(&self) -> Option<BlockId> {
        *self.committed_block.read()
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            pools: self.pools.len(),
            positions: self.positions.len(),
            priced_assets: self.prices.len(),
            committed_height: self.committed_height.load(Ordering::Acquire),
            epoch: self.epoch.load(Ordering::Acquire),
            stale_rejects: self.stale_rejects.load(Ordering::Relaxed),
            decode_rejects: self.decode_rejects.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
        }
    }
}

impl Default for WorldStateStore {
    fn default() -> Self {
        Self::new()
    }
}

fn prune<T>(versions: &mut Versions<T>, retention: usize) {
    while versions.len() > retention {
        versions.remove(0);
    }
}

/// Immutable point-in-time read view over the store.
///
/// Snapshots are cheap (an `Arc` clone plus two integers); resolution to the
/// snapshot height happens per key at read time.
#[derive(Clone)]
pub struct Snapshot {
    store: Arc<WorldStateStore>,
    height: u64,
    epoch: u64,
}

impl Snapshot {
    pub fn height(&self) -> u64 {
        self.height
    }

    /// Whether the store has rolled back since this snapshot was taken.
    /// A false result means every view built from it references state that
    /// may no longer be canonical.
    pub fn is_current(&self) -> bool {
        self.epoch == self.store.epoch()
    }

    /// Block identity this snapshot was built at. The hash is only known
    /// when the snapshot height matches the store's committed tip.
    pub fn block(&self) -> BlockId {
        match *self.store.committed_block.read() {
            Some(b) if b.height == self.height => b,
            _ => BlockId::new(self.height, B256::ZERO),
        }
    }

    pub fn pool(&self, id: &Address) -> Option<Arc<Pool>> {
        self.store
            .pools
            .get(id)
            .and_then(|versions| latest_at(&versions, self.height))
    }

    /// Pools carrying `token`, resolved at the snapshot height.
    pub fn pools_with_token(&self, token: &Address) -> Vec<Arc<Pool>> {
        let Some(ids) = self.store.pools_by_token.get(token) else {
            return Vec::new();
        };
        ids.iter().filter_map(|id| self.pool(&id)).collect()
    }

    pub fn price(&self, asset: &Address) -> Option<TokenPrice> {
        self.store
            .prices
            .get(asset)
            .and_then(|versions| latest_at(&versions, self.height))
            .map(|p| *p)
    }

    pub fn position(&self, id: &PositionId) -> Option<Arc<Position>> {
        self.store
            .positions
            .get(id)
            .and_then(|versions| latest_at(&versions, self.height))
    }

    /// Positions exposed to `asset` on either side, resolved at the snapshot
    /// height. Index entries whose position no longer touches the asset are
    /// filtered out here rather than eagerly unlinked.
    pub fn positions_exposed_to(&self, asset: &Address) -> Vec<Arc<Position>> {
        let Some(ids) = self.store.positions_by_asset.get(asset) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| self.position(&id))
            .filter(|p| p.exposed_assets().contains(asset))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{PoolKind, Token};
    use alloy::primitives::I256;
    use smallvec::smallvec;

    fn block(height: u64) -> BlockId {
        BlockId::new(height, B256::repeat_byte(height as u8))
    }

    fn test_pool(id: u8) -> Pool {
        Pool {
            id: Address::repeat_byte(id),
            protocol: "uniswap-v2".to_string(),
            kind: PoolKind::ConstantProduct,
            tokens: smallvec![
                Token::new(Address::repeat_byte(1), 18),
                Token::new(Address::repeat_byte(2), 18),
            ],
            reserves: smallvec![U256::from(1_000u64), U256::from(1_000u64)],
            fee_bps: 30,
            amplification: 0,
            concentration: 1,
        }
    }

    fn reserve_event(pool: u8, height: u64, r0: u64, r1: u64) -> InboundEvent {
        InboundEvent::PriceOrReserveUpdate {
            pool_id: Address::repeat_byte(pool),
            block: block(height),
            reserves: Some(ReserveUpdate::Absolute(smallvec![
                U256::from(r0),
                U256::from(r1)
            ])),
            token_prices: smallvec![],
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_versioned_reads() {
        let store = Arc::new(WorldStateStore::new());
        store.register_pool(test_pool(0xAA), block(1));

        store.apply_update(&reserve_event(0xAA, 2, 2_000, 500)).unwrap();
        store.apply_update(&reserve_event(0xAA, 3, 3_000, 400)).unwrap();

        // Point-in-time resolution
        let at_2 = store.snapshot_at(2);
        assert_eq!(
            at_2.pool(&Address::repeat_byte(0xAA)).unwrap().reserves[0],
            U256::from(2_000u64)
        );
        let at_3 = store.snapshot_at(3);
        assert_eq!(
            at_3.pool(&Address::repeat_byte(0xAA)).unwrap().reserves[0],
            U256::from(3_000u64)
        );
    }

    #[test]
    fn test_replay_at_same_height_is_rejected() {
        let store = Arc::new(WorldStateStore::new());
        store.register_pool(test_pool(0xAA), block(1));

        store.apply_update(&reserve_event(0xAA, 2, 2_000, 500)).unwrap();
        let before = store.snapshot().pool(&Address::repeat_byte(0xAA)).unwrap();

        // Second application at the same height: rejected as non-newer.
        let err = store
            .apply_update(&reserve_event(0xAA, 2, 9_999, 9_999))
            .unwrap_err();
        assert!(matches!(err, StateError::StaleUpdate { .. }));

        let after = store.snapshot().pool(&Address::repeat_byte(0xAA)).unwrap();
        assert_eq!(before.reserves, after.reserves);
        assert_eq!(store.stats().stale_rejects, 1);
    }

    #[test]
    fn test_negative_reserve_rejected() {
        let store = Arc::new(WorldStateStore::new());
        store.register_pool(test_pool(0xAA), block(1));

        let event = InboundEvent::PriceOrReserveUpdate {
            pool_id: Address::repeat_byte(0xAA),
            block: block(2),
            reserves: Some(ReserveUpdate::Delta(smallvec![
                I256::try_from(-5_000i64).unwrap(),
                I256::try_from(100i64).unwrap()
            ])),
            token_prices: smallvec![],
            timestamp: Utc::now(),
        };

        let err = store.apply_update(&event).unwrap_err();
        assert!(matches!(err, StateError::NegativeReserve { index: 0, .. }));
        assert_eq!(store.stats().decode_rejects, 1);

        // Pool still at its registered reserves.
        let pool = store.snapshot().pool(&Address::repeat_byte(0xAA)).unwrap();
        assert_eq!(pool.reserves[0], U256::from(1_000u64));
    }

    #[test]
    fn test_delta_reserves_apply() {
        let store = Arc::new(WorldStateStore::new());
        store.register_pool(test_pool(0xAA), block(1));

        let event = InboundEvent::PriceOrReserveUpdate {
            pool_id: Address::repeat_byte(0xAA),
            block: block(2),
            reserves: Some(ReserveUpdate::Delta(smallvec![
                I256::try_from(500i64).unwrap(),
                I256::try_from(-300i64).unwrap()
            ])),
            token_prices: smallvec![],
            timestamp: Utc::now(),
        };
        store.apply_update(&event).unwrap();

        let pool = store.snapshot().pool(&Address::repeat_byte(0xAA)).unwrap();
        assert_eq!(pool.reserves[0], U256::from(1_500u64));
        assert_eq!(pool.reserves[1], U256::from(700u64));
    }

    #[test]
    fn test_rollback_discards_and_bumps_epoch() {
        let store = Arc::new(WorldStateStore::new());
        store.register_pool(test_pool(0xAA), block(1));
        store.apply_update(&reserve_event(0xAA, 2, 2_000, 500)).unwrap();
        store.apply_update(&reserve_event(0xAA, 3, 3_000, 400)).unwrap();

        let snap = store.snapshot();
        assert!(snap.is_current());

        let discarded = store.rollback(2);
        assert_eq!(discarded, 1);
        assert!(!snap.is_current());
        assert_eq!(store.height(), 2);

        // State resolves to the pre-reorg version.
        let pool = store.snapshot().pool(&Address::repeat_byte(0xAA)).unwrap();
        assert_eq!(pool.reserves[0], U256::from(2_000u64));

        // Heights above the rollback can be reapplied.
        store.apply_update(&reserve_event(0xAA, 3, 7_000, 300)).unwrap();
        let pool = store.snapshot().pool(&Address::repeat_byte(0xAA)).unwrap();
        assert_eq!(pool.reserves[0], U256::from(7_000u64));
    }

    #[test]
    fn test_position_exposure_index() {
        let store = Arc::new(WorldStateStore::new());
        let asset = Address::repeat_byte(0xC0);

        let event = InboundEvent::PositionChanged {
            position_id: PositionId(B256::repeat_byte(1)),
            owner: Address::repeat_byte(9),
            protocol: "aave-v3".to_string(),
            collateral: smallvec![PositionLegUpdate {
                asset,
                amount: U256::from(1_000u64),
                decimals: 6,
                liquidation_threshold_bps: 8_000,
            }],
            debt: smallvec![],
            block: block(5),
        };
        store.apply_update(&event).unwrap();

        let snap = store.snapshot();
        let exposed = snap.positions_exposed_to(&asset);
        assert_eq!(exposed.len(), 1);
        assert_eq!(exposed[0].owner, Address::repeat_byte(9));
    }

    #[test]
    fn test_price_versions_and_staleness_counting() {
        let store = Arc::new(WorldStateStore::new());
        let asset = Address::repeat_byte(0xC0);

        let tick = |height: u64, price: u64| InboundEvent::PriceOrReserveUpdate {
            pool_id: Address::ZERO,
            block: block(height),
            reserves: None,
            token_prices: smallvec![(asset, U256::from(price))],
            timestamp: Utc::now(),
        };

        store.apply_update(&tick(10, 100_000_000)).unwrap();
        store.apply_update(&tick(11, 110_000_000)).unwrap();
        assert!(store.apply_update(&tick(11, 120_000_000)).is_err());

        let snap = store.snapshot();
        assert_eq!(snap.price(&asset).unwrap().price, U256::from(110_000_000u64));
        assert_eq!(store.stats().stale_rejects, 1);
    }
}
