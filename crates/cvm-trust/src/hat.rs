//! C3 — the HAT (behaviour / web-of-trust / economic / temporal) score
//! engine. Every sub-score and the final blend are plain integer
//! arithmetic so that `breakdown` is bit-exact across nodes: no floating
//! point appears anywhere on a consensus-deciding path.

use crate::graph::TrustGraph;
use cvm_core::config::HatWeights;
use cvm_core::hash::{sha256, sha256_concat, Hash32};
use cvm_core::kv::KvStore;
use cvm_core::Address;
use serde::{Deserialize, Serialize};

/// Objective trade-history inputs to the behaviour sub-score.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BehaviorMetrics {
    pub window_successes: u32,
    pub window_total: u32,
    pub total_trades: u32,
    pub partner_diversity: u32,
}

/// Objective bonded-stake inputs to the economic sub-score.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StakeInfo {
    pub bonded_amount: u64,
    pub lock_duration_secs: u64,
}

/// Objective account-age/activity inputs to the temporal sub-score.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TemporalMetrics {
    pub account_age_secs: u64,
    pub seconds_since_last_active: u64,
    pub activity_count_90d: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HatBreakdown {
    pub behaviour: u32,
    pub wot: u32,
    pub economic: u32,
    pub temporal: u32,
    pub final_score: u32,
}

fn clamp_0_100(v: i64) -> u32 {
    v.clamp(0, 100) as u32
}

/// One coin-unit of bonded stake worth 1 economic point, up to 70 points.
const ECONOMIC_AMOUNT_UNIT: u64 = 1_000;
const ECONOMIC_AMOUNT_CEILING: u64 = 70;
/// One day of lock duration worth 1 economic point, up to 30 points.
const ECONOMIC_LOCK_UNIT_SECS: u64 = 86_400;
const ECONOMIC_LOCK_CEILING: u64 = 30;

/// One month of account age worth 1 temporal point, up to 60 points.
const TEMPORAL_AGE_UNIT_SECS: u64 = 30 * 86_400;
const TEMPORAL_AGE_CEILING: u64 = 60;
const TEMPORAL_INACTIVE_THRESHOLD_SECS: u64 = 180 * 86_400;
const TEMPORAL_ACTIVITY_CEILING: u32 = 40;

pub fn behaviour_score(m: &BehaviorMetrics) -> u32 {
    let ratio: i64 = if m.window_total == 0 {
        50
    } else {
        (m.window_successes as i64 * 100) / m.window_total as i64
    };
    let diversity_bonus = (m.partner_diversity.min(20) / 2) as i64;
    let volume_bonus = (m.total_trades.min(1_000) / 100).min(10) as i64;
    clamp_0_100(ratio + diversity_bonus + volume_bonus - 10)
}

pub fn economic_score(s: &StakeInfo) -> u32 {
    let amount_component = (s.bonded_amount / ECONOMIC_AMOUNT_UNIT).min(ECONOMIC_AMOUNT_CEILING);
    let lock_component = (s.lock_duration_secs / ECONOMIC_LOCK_UNIT_SECS).min(ECONOMIC_LOCK_CEILING);
    clamp_0_100((amount_component + lock_component) as i64)
}

pub fn temporal_score(t: &TemporalMetrics) -> u32 {
    let age_component = (t.account_age_secs / TEMPORAL_AGE_UNIT_SECS).min(TEMPORAL_AGE_CEILING);
    let activity_component: u64 = if t.seconds_since_last_active > TEMPORAL_INACTIVE_THRESHOLD_SECS {
        0
    } else {
        t.activity_count_90d.min(TEMPORAL_ACTIVITY_CEILING) as u64
    };
    clamp_0_100((age_component + activity_component) as i64)
}

pub struct HatEngine<S: KvStore> {
    graph: std::sync::Arc<TrustGraph<S>>,
    weights: HatWeights,
    max_path_depth: u32,
}

impl<S: KvStore> HatEngine<S> {
    pub fn new(graph: std::sync::Arc<TrustGraph<S>>, weights: HatWeights, max_path_depth: u32) -> Self {
        Self { graph, weights, max_path_depth }
    }

    pub fn wot_score(&self, address: &Address, viewer: &Address) -> u32 {
        let (rep, _had_data) = self.graph.weighted_reputation(viewer, address, self.max_path_depth);
        clamp_0_100(50 + rep as i64)
    }

    pub fn final_score(&self, behaviour: u32, wot: u32, economic: u32, temporal: u32) -> u32 {
        let w = &self.weights;
        let total = behaviour as i64 * w.behaviour as i64
            + wot as i64 * w.wot as i64
            + economic as i64 * w.economic as i64
            + temporal as i64 * w.temporal as i64;
        clamp_0_100(total / 100)
    }

    /// Deterministic component-wise breakdown. Calling this three times
    /// in succession with the same inputs must produce byte-identical
    /// structs.
    pub fn breakdown(
        &self,
        address: &Address,
        viewer: &Address,
        behaviour_inputs: &BehaviorMetrics,
        stake_inputs: &StakeInfo,
        temporal_inputs: &TemporalMetrics,
    ) -> HatBreakdown {
        let behaviour = behaviour_score(behaviour_inputs);
        let wot = self.wot_score(address, viewer);
        let economic = economic_score(stake_inputs);
        let temporal = temporal_score(temporal_inputs);
        let final_score = self.final_score(behaviour, wot, economic, temporal);
        HatBreakdown { behaviour, wot, economic, temporal, final_score }
    }

    /// `H(behaviour) ∥ H(wot) ∥ H(economic) ∥ H(temporal) ∥ final_score ∥
    /// block_height`, used for cross-node parity checks (C9).
    pub fn consensus_hash(breakdown: &HatBreakdown, block_height: u64) -> Hash32 {
        let h_behaviour = sha256(&breakdown.behaviour.to_le_bytes());
        let h_wot = sha256(&breakdown.wot.to_le_bytes());
        let h_economic = sha256(&breakdown.economic.to_le_bytes());
        let h_temporal = sha256(&breakdown.temporal.to_le_bytes());
        sha256_concat(&[
            &h_behaviour,
            &h_wot,
            &h_economic,
            &h_temporal,
            &breakdown.final_score.to_le_bytes(),
            &block_height.to_le_bytes(),
        ])
    }
}

/// `discount = min(base_gas*reputation*5/1000, base_gas/2)`; monotone
/// non-decreasing in `reputation`, capped at 50% of `base_gas`.
pub fn apply_gas_discount(base_gas: u64, reputation: u32) -> u64 {
    let discount_raw = (base_gas as u128 * reputation as u128 * 5) / 1000;
    let cap = base_gas as u128 / 2;
    let discount = discount_raw.min(cap) as u64;
    base_gas - discount
}

/// `0` below reputation 80; `100_000 * (20 + (reputation-80)) / 20` at or
/// above it. Exactly `200_000` at reputation 100.
pub fn free_gas_allowance(reputation: u32) -> u64 {
    if reputation < 80 {
        return 0;
    }
    let r = reputation.min(100) as u64;
    100_000 * (20 + (r - 80)) / 20
}

/// Operation-specific reputation thresholds. Unlisted operations default
/// to an always-pass threshold of 0; `deployment` (50) and
/// `cross_format_call` (70) are the named exceptions, and
/// `contract_execution` gets a conservative floor so a deeply
/// negative-reputation address cannot execute contracts at all.
pub fn trust_threshold(operation: &str) -> u32 {
    match operation {
        "deployment" => 50,
        "cross_format_call" => 70,
        "contract_execution" => 10,
        _ => 0,
    }
}

pub fn trust_gate(reputation: u32, operation: &str) -> bool {
    reputation >= trust_threshold(operation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gas_discount_monotone_and_capped_at_half() {
        // The discount itself is monotone non-decreasing in reputation,
        // and never exceeds half of base_gas.
        let base = 100_000;
        let discount_at = |r: u32| base - apply_gas_discount(base, r);
        assert!(discount_at(60) <= discount_at(80));
        assert!(discount_at(100) <= base / 2);
    }

    #[test]
    fn scenario_s2_gas_and_free_gas_at_reputation_80() {
        assert_eq!(apply_gas_discount(100_000, 80), 60_000);
        assert_eq!(free_gas_allowance(80), 100_000);
    }

    #[test]
    fn free_gas_boundary_property() {
        assert_eq!(free_gas_allowance(79), 0);
        assert_eq!(free_gas_allowance(80), 100_000);
        assert_eq!(free_gas_allowance(100), 200_000);
    }

    #[test]
    fn consensus_hash_is_deterministic() {
        let b = HatBreakdown { behaviour: 10, wot: 20, economic: 30, temporal: 40, final_score: 25 };
        let h1 = HatEngine::<cvm_core::kv::MemoryKvStore>::consensus_hash(&b, 100);
        let h2 = HatEngine::<cvm_core::kv::MemoryKvStore>::consensus_hash(&b, 100);
        assert_eq!(h1, h2);
    }

    #[test]
    fn trust_gate_thresholds() {
        assert!(trust_gate(50, "deployment"));
        assert!(!trust_gate(49, "deployment"));
        assert!(trust_gate(70, "cross_format_call"));
        assert!(!trust_gate(69, "cross_format_call"));
    }
}
