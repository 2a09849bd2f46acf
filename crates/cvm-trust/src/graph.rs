//! C2 — directed weighted trust edges with staked bonds, bonded votes, and
//! bounded-depth path search over the resulting graph.

use crate::error::TrustError;
use cvm_core::config::TrustGraphConfig;
use cvm_core::kv::{join_key, KvStore};
use cvm_core::{codec, Address, Hash32};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

const TRUST_PREFIX: &[u8] = b"TRUST";
const TRUST_IN_PREFIX: &[u8] = b"TRUST_IN";
const TRUST_AUDIT_PREFIX: &[u8] = b"TRUST_AUDIT";
const VOTE_PREFIX: &[u8] = b"VOTE";
const VOTES_BY_TARGET_PREFIX: &[u8] = b"VOTES";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustEdge {
    pub from: Address,
    pub to: Address,
    pub weight: i32,
    pub established_at: u32,
    pub bond: u64,
    pub bond_tx: Hash32,
    pub slashed: bool,
    pub slash_tx: Hash32,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondedVote {
    pub voter: Address,
    pub target: Address,
    pub weight: i32,
    pub bond: u64,
    pub bond_tx: Hash32,
    pub slashed: bool,
    pub slash_tx: Hash32,
    pub timestamp: u32,
    pub reason: String,
}

/// `bond >= min_bond + per_point * |weight|`. Shared by edges and bonded
/// votes, which carry the same bond discipline.
pub fn required_bond(cfg: &TrustGraphConfig, weight: i32) -> u64 {
    cfg.min_bond + cfg.per_point * (weight.unsigned_abs() as u64)
}

fn validate_weight(weight: i32) -> Result<(), TrustError> {
    if weight == 0 || !(-100..=100).contains(&weight) {
        return Err(TrustError::WeightOutOfRange(weight));
    }
    Ok(())
}

/// One simple path from a viewer to a target, with its fixed-point total
/// weight. `weight_scaled` is in units of 1/10_000 (so +1.0 == 10_000),
/// the product of `(edge.weight / 100)` along every hop — computed in
/// integer arithmetic because path weight ultimately feeds the HAT
/// web-of-trust sub-score, a consensus value (see design notes: no
/// floating point on a consensus path).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustPath {
    pub hops: Vec<Address>,
    pub weight_scaled: i64,
}

pub struct TrustGraph<S: KvStore> {
    store: Arc<S>,
    config: TrustGraphConfig,
}

impl<S: KvStore> TrustGraph<S> {
    pub fn new(store: Arc<S>, config: TrustGraphConfig) -> Self {
        Self { store, config }
    }

    fn forward_key(from: &Address, to: &Address) -> Vec<u8> {
        join_key(&[TRUST_PREFIX, &from.0, &to.0])
    }

    fn reverse_key(to: &Address, from: &Address) -> Vec<u8> {
        join_key(&[TRUST_IN_PREFIX, &to.0, &from.0])
    }

    fn audit_key(from: &Address, to: &Address, bond_tx: &Hash32) -> Vec<u8> {
        join_key(&[TRUST_AUDIT_PREFIX, &from.0, &to.0, bond_tx])
    }

    fn read_edge(&self, key: &[u8]) -> Option<TrustEdge> {
        self.store.read(key).and_then(|bytes| codec::decode(&bytes).ok())
    }

    fn write_edge(&self, edge: &TrustEdge) -> Result<(), TrustError> {
        let fwd = Self::forward_key(&edge.from, &edge.to);
        let rev = Self::reverse_key(&edge.to, &edge.from);
        let encoded = codec::encode(edge).map_err(|e| TrustError::Storage(e.to_string()))?;
        let mut batch = self.store.batch();
        batch.put(fwd, encoded.clone());
        batch.put(rev, encoded);
        batch.commit().map_err(|e| TrustError::Storage(e.to_string()))
    }

    /// Adds a new trust edge. Rejects on invalid weight, insufficient
    /// bond, self-edges, or a live (non-slashed) duplicate for the same
    /// `(from, to)` pair. If a prior edge for the pair was slashed, it is
    /// archived for audit before the new edge becomes current — this is
    /// how "an edge is never mutated except to set slashed" coexists with
    /// "the bonder can re-establish trust after a slash is resolved".
    pub fn add_edge(
        &self,
        from: Address,
        to: Address,
        weight: i32,
        bond: u64,
        bond_tx: Hash32,
        reason: String,
        established_at: u32,
    ) -> Result<TrustEdge, TrustError> {
        if from == to {
            return Err(TrustError::SelfEdgeForbidden);
        }
        validate_weight(weight)?;
        let required = required_bond(&self.config, weight);
        if bond < required {
            return Err(TrustError::BondInsufficient { bond, weight, required });
        }

        let fwd_key = Self::forward_key(&from, &to);
        if let Some(existing) = self.read_edge(&fwd_key) {
            if !existing.slashed {
                return Err(TrustError::DuplicateEdge);
            }
            let archive_key = Self::audit_key(&from, &to, &existing.bond_tx);
            let encoded = codec::encode(&existing).map_err(|e| TrustError::Storage(e.to_string()))?;
            self.store.write(&archive_key, &encoded);
        }

        let edge = TrustEdge {
            from,
            to,
            weight,
            established_at,
            bond,
            bond_tx,
            slashed: false,
            slash_tx: [0u8; 32],
            reason,
        };
        self.write_edge(&edge)?;
        Ok(edge)
    }

    /// Flips `slashed = true` on the current edge for `(from, to)`. The
    /// edge is never otherwise mutated.
    pub fn slash_edge(&self, from: Address, to: Address, slash_tx: Hash32) -> Result<TrustEdge, TrustError> {
        let fwd_key = Self::forward_key(&from, &to);
        let mut edge = self.read_edge(&fwd_key).ok_or(TrustError::EdgeNotFound)?;
        edge.slashed = true;
        edge.slash_tx = slash_tx;
        self.write_edge(&edge)?;
        Ok(edge)
    }

    pub fn outgoing(&self, from: &Address) -> Vec<TrustEdge> {
        let prefix = join_key(&[TRUST_PREFIX, &from.0]);
        self.store
            .scan(&prefix)
            .into_iter()
            .filter_map(|(_, v)| codec::decode(&v).ok())
            .collect()
    }

    pub fn incoming(&self, to: &Address) -> Vec<TrustEdge> {
        let prefix = join_key(&[TRUST_IN_PREFIX, &to.0]);
        self.store
            .scan(&prefix)
            .into_iter()
            .filter_map(|(k, _)| {
                // reverse index stores the same encoded TrustEdge value, so
                // decode directly rather than re-deriving from the key.
                self.store.read(&k).and_then(|v| codec::decode(&v).ok())
            })
            .collect()
    }

    // --- bonded votes ---

    fn vote_key(bond_tx: &Hash32) -> Vec<u8> {
        join_key(&[VOTE_PREFIX, bond_tx])
    }

    fn vote_by_target_key(target: &Address, bond_tx: &Hash32) -> Vec<u8> {
        join_key(&[VOTES_BY_TARGET_PREFIX, &target.0, bond_tx])
    }

    pub fn record_vote(
        &self,
        voter: Address,
        target: Address,
        weight: i32,
        bond: u64,
        bond_tx: Hash32,
        reason: String,
        timestamp: u32,
    ) -> Result<BondedVote, TrustError> {
        validate_weight(weight)?;
        let required = required_bond(&self.config, weight);
        if bond < required {
            return Err(TrustError::BondInsufficient { bond, weight, required });
        }
        let primary_key = Self::vote_key(&bond_tx);
        if self.store.exists(&primary_key) {
            return Err(TrustError::DuplicateVote);
        }

        let vote = BondedVote {
            voter,
            target,
            weight,
            bond,
            bond_tx,
            slashed: false,
            slash_tx: [0u8; 32],
            timestamp,
            reason,
        };
        self.write_vote(&vote)?;
        Ok(vote)
    }

    fn write_vote(&self, vote: &BondedVote) -> Result<(), TrustError> {
        let primary = Self::vote_key(&vote.bond_tx);
        let by_target = Self::vote_by_target_key(&vote.target, &vote.bond_tx);
        let encoded = codec::encode(vote).map_err(|e| TrustError::Storage(e.to_string()))?;
        let mut batch = self.store.batch();
        batch.put(primary, encoded.clone());
        batch.put(by_target, encoded);
        batch.commit().map_err(|e| TrustError::Storage(e.to_string()))
    }

    pub fn slash_vote(&self, bond_tx: Hash32, slash_tx: Hash32) -> Result<BondedVote, TrustError> {
        let primary = Self::vote_key(&bond_tx);
        let mut vote: BondedVote = self
            .store
            .read(&primary)
            .and_then(|b| codec::decode(&b).ok())
            .ok_or(TrustError::VoteNotFound)?;
        vote.slashed = true;
        vote.slash_tx = slash_tx;
        self.write_vote(&vote)?;
        info!(voter = %vote.voter, target = %vote.target, "vote slashed");
        Ok(vote)
    }

    pub fn get_vote(&self, bond_tx: &Hash32) -> Option<BondedVote> {
        let primary = Self::vote_key(bond_tx);
        self.store.read(&primary).and_then(|b| codec::decode(&b).ok())
    }

    pub fn votes_for_target(&self, target: &Address) -> Vec<BondedVote> {
        let prefix = join_key(&[VOTES_BY_TARGET_PREFIX, &target.0]);
        self.store
            .scan(&prefix)
            .into_iter()
            .filter_map(|(_, v)| codec::decode(&v).ok())
            .collect()
    }

    // --- path search & weighted reputation ---

    /// All simple paths `from -> ... -> to` up to `max_depth` hops, where
    /// every hop is non-slashed and has `weight >= min_hop_weight`.
    /// Visited-set is threaded explicitly through the recursion (not
    /// per-frame) so a cycle anywhere in the walk is rejected, per the
    /// design note on trust-path cycles.
    pub fn find_paths(&self, from: &Address, to: &Address, max_depth: u32) -> Vec<TrustPath> {
        let mut results = Vec::new();
        let mut visited = HashSet::new();
        visited.insert(*from);
        let mut hops = Vec::new();
        self.dfs(from, to, max_depth, &mut visited, &mut hops, 10_000, &mut results);
        results.sort_by(|a, b| b.weight_scaled.cmp(&a.weight_scaled));
        results
    }

    #[allow(clippy::too_many_arguments)]
    fn dfs(
        &self,
        current: &Address,
        target: &Address,
        depth_remaining: u32,
        visited: &mut HashSet<Address>,
        hops: &mut Vec<Address>,
        weight_scaled_so_far: i64,
        results: &mut Vec<TrustPath>,
    ) {
        if depth_remaining == 0 {
            return;
        }
        for edge in self.outgoing(current) {
            if edge.slashed || edge.weight < self.config.min_hop_weight {
                continue;
            }
            if visited.contains(&edge.to) {
                continue;
            }
            let hop_scaled = edge.weight as i64 * 100; // weight/100 scaled by 10_000
            let combined = if hops.is_empty() {
                hop_scaled
            } else {
                (weight_scaled_so_far * hop_scaled) / 10_000
            };
            hops.push(edge.to);
            if edge.to == *target {
                results.push(TrustPath {
                    hops: hops.clone(),
                    weight_scaled: combined,
                });
            } else {
                visited.insert(edge.to);
                self.dfs(&edge.to, target, depth_remaining - 1, visited, hops, combined, results);
                visited.remove(&edge.to);
            }
            hops.pop();
        }
    }

    /// `50 +` this value is the web-of-trust HAT sub-score input. Returns
    /// `(value, had_data)`; `had_data = false` means "no-data", which the
    /// caller should *not* treat as a confident zero.
    pub fn weighted_reputation(&self, viewer: &Address, target: &Address, max_depth: u32) -> (i32, bool) {
        if viewer == target {
            return self.unweighted_inbound_mean(target);
        }

        let votes = self.votes_for_target(target);
        let mut numerator: i64 = 0;
        let mut denominator: i64 = 0;
        for vote in votes.iter().filter(|v| !v.slashed) {
            let paths = self.find_paths(viewer, &vote.voter, max_depth);
            for path in paths {
                numerator += vote.weight as i64 * path.weight_scaled;
                denominator += path.weight_scaled;
            }
        }

        if denominator == 0 {
            return self.unweighted_inbound_mean(target);
        }
        ((numerator / denominator) as i32, true)
    }

    fn unweighted_inbound_mean(&self, target: &Address) -> (i32, bool) {
        let inbound: Vec<i32> = self
            .incoming(target)
            .into_iter()
            .filter(|e| !e.slashed)
            .map(|e| e.weight)
            .collect();
        if inbound.is_empty() {
            return (0, false);
        }
        let sum: i64 = inbound.iter().map(|w| *w as i64).sum();
        ((sum / inbound.len() as i64) as i32, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cvm_core::kv::MemoryKvStore;

    fn addr(b: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = b;
        Address(bytes)
    }

    fn graph() -> TrustGraph<MemoryKvStore> {
        TrustGraph::new(Arc::new(MemoryKvStore::new()), TrustGraphConfig::default())
    }

    #[test]
    fn rejects_self_edges() {
        let g = graph();
        let a = addr(1);
        let err = g.add_edge(a, a, 50, 10_000, [0; 32], "x".into(), 0).unwrap_err();
        assert_eq!(err, TrustError::SelfEdgeForbidden);
    }

    #[test]
    fn rejects_zero_and_out_of_range_weight() {
        let g = graph();
        assert!(matches!(
            g.add_edge(addr(1), addr(2), 0, 100_000, [0; 32], "x".into(), 0),
            Err(TrustError::WeightOutOfRange(0))
        ));
        assert!(matches!(
            g.add_edge(addr(1), addr(2), 150, 100_000, [0; 32], "x".into(), 0),
            Err(TrustError::WeightOutOfRange(150))
        ));
    }

    #[test]
    fn rejects_insufficient_bond() {
        let g = graph();
        let required = required_bond(&TrustGraphConfig::default(), 80);
        let err = g
            .add_edge(addr(1), addr(2), 80, required - 1, [1; 32], "x".into(), 0)
            .unwrap_err();
        assert!(matches!(err, TrustError::BondInsufficient { .. }));
    }

    #[test]
    fn rejects_duplicate_live_edge() {
        let g = graph();
        let required = required_bond(&TrustGraphConfig::default(), 80);
        g.add_edge(addr(1), addr(2), 80, required, [1; 32], "x".into(), 0).unwrap();
        let err = g
            .add_edge(addr(1), addr(2), 90, required + 1000, [2; 32], "y".into(), 1)
            .unwrap_err();
        assert_eq!(err, TrustError::DuplicateEdge);
    }

    #[test]
    fn slashed_edge_allows_a_new_one_and_keeps_audit_trail() {
        let g = graph();
        let required = required_bond(&TrustGraphConfig::default(), 80);
        g.add_edge(addr(1), addr(2), 80, required, [1; 32], "x".into(), 0).unwrap();
        g.slash_edge(addr(1), addr(2), [9; 32]).unwrap();
        let replaced = g
            .add_edge(addr(1), addr(2), 60, required, [3; 32], "z".into(), 5)
            .unwrap();
        assert!(!replaced.slashed);
        assert_eq!(replaced.weight, 60);
    }

    #[test]
    fn path_search_finds_direct_and_indirect_paths_ranked_by_weight() {
        let g = graph();
        let required = required_bond(&TrustGraphConfig::default(), 90);
        g.add_edge(addr(1), addr(2), 80, required, [1; 32], "".into(), 0).unwrap();
        g.add_edge(addr(1), addr(3), 50, required, [2; 32], "".into(), 0).unwrap();
        g.add_edge(addr(2), addr(3), 90, required, [3; 32], "".into(), 0).unwrap();

        let paths = g.find_paths(&addr(1), &addr(3), 3);
        assert_eq!(paths.len(), 2);
        // indirect (0.8*0.9=0.72) ranks above direct (0.50)
        assert_eq!(paths[0].hops, vec![addr(2), addr(3)]);
        assert_eq!(paths[0].weight_scaled, 7_200);
        assert_eq!(paths[1].hops, vec![addr(3)]);
        assert_eq!(paths[1].weight_scaled, 5_000);
    }

    #[test]
    fn path_search_excludes_slashed_and_low_weight_hops() {
        let g = graph();
        let required = required_bond(&TrustGraphConfig::default(), 9);
        g.add_edge(addr(1), addr(2), 9, required, [1; 32], "".into(), 0).unwrap();
        let paths = g.find_paths(&addr(1), &addr(2), 3);
        assert!(paths.is_empty(), "hop weight below min_hop_weight must be excluded");
    }

    #[test]
    fn self_viewer_reputation_is_mean_of_inbound_weights() {
        let g = graph();
        let required = required_bond(&TrustGraphConfig::default(), 50);
        g.add_edge(addr(1), addr(3), 50, required, [1; 32], "".into(), 0).unwrap();
        g.add_edge(addr(2), addr(3), 30, required, [2; 32], "".into(), 0).unwrap();
        let (rep, had_data) = g.weighted_reputation(&addr(3), &addr(3), 3);
        assert!(had_data);
        assert_eq!(rep, 40);
    }

    #[test]
    fn missing_target_yields_no_data() {
        let g = graph();
        let (rep, had_data) = g.weighted_reputation(&addr(1), &addr(9), 3);
        assert_eq!(rep, 0);
        assert!(!had_data);
    }
}
