//! Cyclic arbitrage detection over the live exchange-rate graph.
//!
//! Tokens are nodes; every (pool, direction) is an edge weighted by the
//! negative log of the achievable unit exchange rate, so a profitable cycle
//! shows up as a negative total weight. Search is a hop-bounded Bellman-Ford
//! relaxation restricted to the subgraph around the triggering update, and
//! every discovered cycle is re-simulated exactly through the pool pricing
//! capability before a candidate is produced.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use alloy::primitives::Address;
use arrayvec::ArrayVec;
use chrono::Utc;
use smallvec::SmallVec;
use tracing::{debug, trace};

use mevscan_feed::GasOracle;
use mevscan_state::{pricing_for, OpportunityKind, Pool, Snapshot, SwapLeg};

use crate::config::ArbitrageConfig;
use crate::deadline::Deadline;
use crate::error::DetectError;
use crate::math;
use crate::scorer::Candidate;

/// Hard ceiling on cycle length; config may ask for less, never more.
const MAX_SUPPORTED_HOPS: usize = 6;

/// One directed edge of the rate graph.
struct RateEdge {
    from: usize,
    to: usize,
    pool: Arc<Pool>,
    in_idx: usize,
    out_idx: usize,
    /// −ln(unit rate after fee)
    weight: f64,
}

/// Arbitrage detector over snapshot state.
pub struct ArbitrageDetector {
    config: ArbitrageConfig,
    gas: Arc<dyn GasOracle>,
}

impl ArbitrageDetector {
    pub fn new(config: ArbitrageConfig, gas: Arc<dyn GasOracle>) -> Self {
        Self { config, gas }
    }

    /// React to a reserve change on `pool_id`. Returns zero or more cycle
    /// candidates, each already simulated with slippage and costed with gas.
    pub fn detect(
        &self,
        pool_id: &Address,
        snap: &Snapshot,
        deadline: &Deadline,
    ) -> Result<Vec<Candidate>, DetectError> {
        let Some(updated) = snap.pool(pool_id) else {
            return Ok(Vec::new());
        };

        let max_hops = self.config.max_hops.clamp(2, MAX_SUPPORTED_HOPS);
        let (tokens, edges) = self.affected_subgraph(&updated, snap);
        if edges.is_empty() {
            return Ok(Vec::new());
        }
        deadline.check()?;

        // Seeds: tokens of the updated pool. Only cycles through the
        // perturbed state can have become profitable with this event.
        let seed_indices: SmallVec<[usize; 4]> = updated
            .tokens
            .iter()
            .filter_map(|t| tokens.iter().position(|a| *a == t.address))
            .collect();

        let mut seen_cycles: HashSet<Vec<Address>> = HashSet::new();
        let mut candidates = Vec::new();
        let snapshot_taken = Instant::now();

        for &start in &seed_indices {
            deadline.check()?;
            for cycle in self.negative_cycles_from(start, &tokens, &edges, max_hops, deadline)? {
                let mut key: Vec<Address> = cycle.iter().map(|e| edges[*e].pool.id).collect();
                key.sort_unstable();
                if !seen_cycles.insert(key) {
                    continue;
                }

                if let Some(candidate) =
                    self.simulate_cycle(&cycle, &edges, snap, snapshot_taken, deadline)?
                {
                    candidates.push(candidate);
                }
            }
        }

        if !candidates.is_empty() {
            debug!(
                pool = %pool_id,
                count = candidates.len(),
                "arbitrage cycles detected"
            );
        }
        Ok(candidates)
    }

    /// Tokens touched by the update plus their direct neighbors, and every
    /// directed edge between them. Bounding the subgraph keeps the
    /// relaxation inside the latency budget regardless of total graph size.
    fn affected_subgraph(
        &self,
        updated: &Arc<Pool>,
        snap: &Snapshot,
    ) -> (Vec<Address>, Vec<RateEdge>) {
        let mut index: HashMap<Address, usize> = HashMap::new();
        let mut tokens: Vec<Address> = Vec::new();
        let mut add_token = |tokens: &mut Vec<Address>, index: &mut HashMap<Address, usize>, a: Address| {
            if let std::collections::hash_map::Entry::Vacant(e) = index.entry(a) {
                e.insert(tokens.len());
                tokens.push(a);
            }
        };

        for t in &updated.tokens {
            add_token(&mut tokens, &mut index, t.address);
        }

        let mut pools: HashMap<Address, Arc<Pool>> = HashMap::new();
        pools.insert(updated.id, updated.clone());

        // One-hop neighborhood.
        let seeds: Vec<Address> = tokens.clone();
        for seed in &seeds {
            for pool in snap.pools_with_token(seed) {
                for t in &pool.tokens {
                    add_token(&mut tokens, &mut index, t.address);
                }
                pools.entry(pool.id).or_insert(pool);
            }
        }
        // Pools linking neighbor tokens to each other (closing edges of
        // longer cycles).
        for token in tokens.clone() {
            for pool in snap.pools_with_token(&token) {
                pools.entry(pool.id).or_insert(pool);
            }
        }

        let mut edges = Vec::new();
        for pool in pools.values() {
            for (i, token_in) in pool.tokens.iter().enumerate() {
                for (j, token_out) in pool.tokens.iter().enumerate() {
                    if i == j {
                        continue;
                    }
                    let (Some(&from), Some(&to)) =
                        (index.get(&token_in.address), index.get(&token_out.address))
                    else {
                        continue;
                    };
                    if let Some(weight) = unit_rate_weight(pool, i, j) {
                        edges.push(RateEdge {
                            from,
                            to,
                            pool: pool.clone(),
                            in_idx: i,
                            out_idx: j,
                            weight,
                        });
                    }
                }
            }
        }

        (tokens, edges)
    }

    /// Hop-bounded relaxation from `start`. `best[h][v]` is the cheapest
    /// exactly-h-hop path start→v; a negative `best[h][start]` with h ≥ 2 is
    /// a candidate cycle, reconstructed through the per-hop parent links.
    fn negative_cycles_from(
        &self,
        start: usize,
        tokens: &[Address],
        edges: &[RateEdge],
        max_hops: usize,
        deadline: &Deadline,
    ) -> Result<Vec<ArrayVec<usize, MAX_SUPPORTED_HOPS>>, DetectError> {
        let n = tokens.len();
        let mut best = vec![vec![f64::INFINITY; n]; max_hops + 1];
        let mut parent: Vec<Vec<Option<(usize, usize)>>> = vec![vec![None; n]; max_hops + 1];
        best[0][start] = 0.0;

        for hop in 1..=max_hops {
            deadline.check()?;
            for (edge_idx, edge) in edges.iter().enumerate() {
                let base = best[hop - 1][edge.from];
                if !base.is_finite() {
                    continue;
                }
                let relaxed = base + edge.weight;
                if relaxed < best[hop][edge.to] {
                    best[hop][edge.to] = relaxed;
                    parent[hop][edge.to] = Some((edge.from, edge_idx));
                }
            }
        }

        let mut cycles = Vec::new();
        for hop in 2..=max_hops {
            if best[hop][start] >= -self.config.cycle_epsilon {
                continue;
            }

            // Walk parents back from (hop, start).
            let mut path: ArrayVec<usize, MAX_SUPPORTED_HOPS> = ArrayVec::new();
            let mut node = start;
            let mut level = hop;
            let mut ok = true;
            while level > 0 {
                let Some((prev, edge_idx)) = parent[level][node] else {
                    ok = false;
                    break;
                };
                path.push(edge_idx);
                node = prev;
                level -= 1;
            }
            if !ok || node != start {
                continue;
            }
            path.reverse();

            // Reject non-simple walks: repeated intermediate tokens or the
            // same pool twice; those re-trade their own impact.
            let mut seen_tokens = HashSet::new();
            seen_tokens.insert(start);
            let mut seen_pools = HashSet::new();
            let simple = path.iter().all(|&e| seen_pools.insert(edges[e].pool.id))
                && path[..path.len() - 1]
                    .iter()
                    .all(|&e| seen_tokens.insert(edges[e].to));
            if simple {
                trace!(hops = hop, "negative cycle found");
                cycles.push(path);
            }
        }
        Ok(cycles)
    }

    /// Re-simulate a cycle with the configured probe capital through the
    /// exact pool pricing, then cost gas and score confidence.
    fn simulate_cycle(
        &self,
        cycle: &[usize],
        edges: &[RateEdge],
        snap: &Snapshot,
        snapshot_taken: Instant,
        deadline: &Deadline,
    ) -> Result<Option<Candidate>, DetectError> {
        let first = &edges[cycle[0]];
        let start_token = first.pool.tokens[first.in_idx];

        // Size the probe from USD capital; without a start-token price the
        // cycle cannot be scored in USD, so skip rather than guess.
        let Some(price) = snap.price(&start_token.address) else {
            debug!(token = %start_token.address, "no price for cycle start token");
            return Ok(None);
        };
        let amount_in = math::usd_to_amount(
            self.config.probe_capital_usd,
            price.price,
            start_token.decimals,
        );
        if amount_in.is_zero() {
            return Ok(None);
        }

        let mut amount = amount_in;
        for &edge_idx in cycle {
            // Checkpoint per simulated hop.
            deadline.check()?;
            let edge = &edges[edge_idx];
            let pricing = pricing_for(edge.pool.kind);
            amount = pricing.quote_output(
                &edge.pool,
                SwapLeg {
                    token_in_idx: edge.in_idx,
                    token_out_idx: edge.out_idx,
                    amount_in: amount,
                },
            )?;
        }

        if amount <= amount_in {
            // Profitable at unit scale but not at probe scale: slippage ate it.
            return Ok(None);
        }

        let gross_usd = math::calculate_usd_f64(
            amount - amount_in,
            price.price,
            start_token.decimals,
        );
        let hops = cycle.len();
        let gas_usd = self.gas.cost_usd(self.config.gas_per_hop * hops as u64);
        let confidence = (0.95
            - self.config.hop_confidence_penalty * (hops.saturating_sub(2)) as f64)
            .clamp(0.05, 0.95);

        let involved: SmallVec<[String; 4]> = cycle
            .iter()
            .map(|&e| edges[e].pool.id.to_string().to_lowercase())
            .collect();
        let mut protocols: SmallVec<[String; 2]> = SmallVec::new();
        for &e in cycle {
            let tag = edges[e].pool.protocol.clone();
            if !protocols.contains(&tag) {
                protocols.push(tag);
            }
        }

        Ok(Some(Candidate {
            kind: OpportunityKind::Arbitrage,
            protocols,
            involved,
            gross_profit_usd: gross_usd,
            gas_cost_usd: gas_usd,
            confidence,
            source_block: snap.block(),
            snapshot_taken,
            detected_at: Utc::now(),
        }))
    }
}

/// Edge weight for a unit trade: −ln(out/in), decimals-normalized.
/// `None` when the pool cannot quote (empty side).
fn unit_rate_weight(pool: &Pool, in_idx: usize, out_idx: usize) -> Option<f64> {
    let token_in = &pool.tokens[in_idx];
    let token_out = &pool.tokens[out_idx];
    let probe = math::pow10(token_in.decimals);

    let out = pricing_for(pool.kind)
        .quote_output(
            pool,
            SwapLeg {
                token_in_idx: in_idx,
                token_out_idx: out_idx,
                amount_in: probe,
            },
        )
        .ok()?;

    let rate = math::amount_to_f64(out, token_out.decimals);
    if rate <= 0.0 || !rate.is_finite() {
        return None;
    }
    Some(-rate.ln())
}
