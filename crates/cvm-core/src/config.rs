//! Every numeric default and tunable this workspace relies on, collected so
//! an embedding node can override any one of them without patching code.
//! Mirrors the shape of `bleep_vm::gas_metering::GasConfig` and
//! `bleep_economics::fee_market::BaseFeeParams`: a plain struct of
//! tunables with a `Default` impl.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HatWeights {
    pub behaviour: u32,
    pub wot: u32,
    pub economic: u32,
    pub temporal: u32,
}

impl Default for HatWeights {
    fn default() -> Self {
        Self {
            behaviour: 30,
            wot: 30,
            economic: 25,
            temporal: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustGraphConfig {
    pub min_bond: u64,
    pub per_point: u64,
    pub max_path_depth: u32,
    pub min_hop_weight: i32,
}

impl Default for TrustGraphConfig {
    fn default() -> Self {
        Self {
            min_bond: 1_000,
            per_point: 10,
            max_path_depth: 3,
            min_hop_weight: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaoConfig {
    pub commit_phase_blocks: u32,
    pub reveal_phase_blocks: u32,
    pub min_votes: u32,
    pub pct_challenger_bounty: u32,
    pub pct_voter_pool: u32,
    pub pct_burn: u32,
    pub pct_wrongly_accused: u32,
}

impl Default for DaoConfig {
    fn default() -> Self {
        Self {
            commit_phase_blocks: 100,
            reveal_phase_blocks: 100,
            min_votes: 3,
            pct_challenger_bounty: 20,
            pct_voter_pool: 50,
            pct_burn: 30,
            pct_wrongly_accused: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub confidence_threshold: f64,
    pub hybrid_confidence_gap: f64,
    pub hybrid_min_confidence: f64,
    pub cache_capacity: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            hybrid_confidence_gap: 0.1,
            hybrid_min_confidence: 0.5,
            cache_capacity: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyConfig {
    pub spike_z_threshold: f64,
    pub drop_z_threshold: f64,
    pub oscillation_threshold: f64,
    pub slow_response_fraction: f64,
    pub erratic_cv_threshold: f64,
    pub vote_bias_threshold: f64,
    pub vote_bias_min_samples: usize,
    pub coordination_threshold: f64,
    pub coordination_min_responses: usize,
    pub coordination_window_ms: i64,
    pub sybil_min_cluster_size: usize,
    pub sybil_rate_tolerance: f64,
    pub sybil_pair_fraction: f64,
    pub window_size: usize,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            spike_z_threshold: 2.5,
            drop_z_threshold: 2.5,
            oscillation_threshold: 0.7,
            slow_response_fraction: 0.5,
            erratic_cv_threshold: 1.5,
            vote_bias_threshold: 0.95,
            vote_bias_min_samples: 20,
            coordination_threshold: 0.8,
            coordination_min_responses: 10,
            coordination_window_ms: 1000,
            sybil_min_cluster_size: 3,
            sybil_rate_tolerance: 0.1,
            sybil_pair_fraction: 0.8,
            window_size: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub min_deploy_reputation: u32,
    pub gc_interval_blocks: u64,
    pub low_rep_inactivity_blocks: u64,
    pub normal_inactivity_blocks: u64,
    pub high_rep_inactivity_blocks: u64,
    pub trust_cache_ttl_secs: u64,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            min_deploy_reputation: 30,
            gc_interval_blocks: 1000,
            low_rep_inactivity_blocks: 1_000,
            normal_inactivity_blocks: 10_000,
            high_rep_inactivity_blocks: 100_000,
            trust_cache_ttl_secs: 24 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinbaseConfig {
    pub miner_share_bps: u32,
    pub rounding_tolerance: u64,
}

impl Default for CoinbaseConfig {
    fn default() -> Self {
        Self {
            miner_share_bps: 7_000,
            rounding_tolerance: 10,
        }
    }
}

/// Aggregate configuration wired into a `ConsensusCore`. Every field here
/// carries a concrete default; the embedding node overrides whichever
/// subset it needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsensusConfig {
    pub hat_weights: HatWeights,
    pub trust_graph: TrustGraphConfig,
    pub dao: DaoConfig,
    pub detector: DetectorConfig,
    pub anomaly: AnomalyConfig,
    pub resource: ResourceConfig,
    pub coinbase: CoinbaseConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hat_weights_sum_to_100() {
        let w = HatWeights::default();
        assert_eq!(w.behaviour + w.wot + w.economic + w.temporal, 100);
    }

    #[test]
    fn coinbase_default_is_70_30() {
        let c = CoinbaseConfig::default();
        assert_eq!(c.miner_share_bps, 7_000);
    }
}
