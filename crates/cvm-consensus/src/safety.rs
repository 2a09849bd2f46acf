//! C9 — the consensus safety validator. Re-runs a deterministic
//! computation three times and compares the results byte-for-byte; any
//! divergence is a `DeterminismFailure`, which must never be silently
//! swallowed.

use crate::error::ConsensusError;
use cvm_core::hash::{sha256_concat, Hash32};
use cvm_core::kv::KvStore;
use cvm_core::Address;
use cvm_trust::hat::{apply_gas_discount, free_gas_allowance, BehaviorMetrics, HatBreakdown, HatEngine, StakeInfo, TemporalMetrics};
use tracing::error;

#[derive(Debug, Clone)]
pub struct DeterminismReport<T> {
    pub is_deterministic: bool,
    pub value: T,
    pub hashes: [Hash32; 3],
}

/// Invokes `hat.breakdown` three times and checks the results and their
/// consensus hashes are byte-identical.
pub fn validate_determinism<S: KvStore>(
    hat: &HatEngine<S>,
    address: &Address,
    viewer: &Address,
    behaviour: &BehaviorMetrics,
    stake: &StakeInfo,
    temporal: &TemporalMetrics,
    block_height: u64,
) -> Result<DeterminismReport<HatBreakdown>, ConsensusError> {
    let runs: Vec<HatBreakdown> = (0..3).map(|_| hat.breakdown(address, viewer, behaviour, stake, temporal)).collect();
    let hashes: Vec<Hash32> =
        runs.iter().map(|b| HatEngine::<S>::consensus_hash(b, block_height)).collect();

    let is_deterministic = runs[0] == runs[1] && runs[1] == runs[2] && hashes[0] == hashes[1] && hashes[1] == hashes[2];
    if !is_deterministic {
        error!(address = %address, "hat.breakdown diverged across repeated calls");
        return Err(ConsensusError::DeterminismFailure("hat.breakdown diverged across repeated calls".into()));
    }
    Ok(DeterminismReport {
        is_deterministic,
        value: runs[0],
        hashes: [hashes[0], hashes[1], hashes[2]],
    })
}

pub fn validate_gas_discount_consensus(base_gas: u64, reputation: u32) -> Result<DeterminismReport<u64>, ConsensusError> {
    let runs: Vec<u64> = (0..3).map(|_| apply_gas_discount(base_gas, reputation)).collect();
    if runs[0] != runs[1] || runs[1] != runs[2] {
        error!(base_gas, reputation, "apply_gas_discount diverged across repeated calls");
        return Err(ConsensusError::DeterminismFailure("apply_gas_discount diverged across repeated calls".into()));
    }
    Ok(DeterminismReport { is_deterministic: true, value: runs[0], hashes: [[0u8; 32]; 3] })
}

pub fn validate_free_gas(reputation: u32) -> Result<DeterminismReport<u64>, ConsensusError> {
    let runs: Vec<u64> = (0..3).map(|_| free_gas_allowance(reputation)).collect();
    if runs[0] != runs[1] || runs[1] != runs[2] {
        return Err(ConsensusError::DeterminismFailure("free_gas_allowance diverged across repeated calls".into()));
    }
    Ok(DeterminismReport { is_deterministic: true, value: runs[0], hashes: [[0u8; 32]; 3] })
}

fn compute_validator_selection_seed(tx_hash: &Hash32, block_hash: &Hash32, height: u64) -> Hash32 {
    sha256_concat(&[tx_hash, block_hash, &height.to_le_bytes()])
}

pub fn validate_validator_selection_seed(
    tx_hash: &Hash32,
    block_hash: &Hash32,
    height: u64,
) -> Result<DeterminismReport<Hash32>, ConsensusError> {
    let runs: Vec<Hash32> = (0..3).map(|_| compute_validator_selection_seed(tx_hash, block_hash, height)).collect();
    if runs[0] != runs[1] || runs[1] != runs[2] {
        return Err(ConsensusError::DeterminismFailure("validator selection seed diverged across repeated calls".into()));
    }
    Ok(DeterminismReport { is_deterministic: true, value: runs[0], hashes: [runs[0], runs[1], runs[2]] })
}

/// `H(total_edges ∥ total_votes ∥ total_disputes ∥ slashed_votes)`, used
/// in peer sync to detect whether two nodes' trust graphs agree.
pub fn trust_graph_state_hash(total_edges: u64, total_votes: u64, total_disputes: u64, slashed_votes: u64) -> Hash32 {
    sha256_concat(&[
        &total_edges.to_le_bytes(),
        &total_votes.to_le_bytes(),
        &total_disputes.to_le_bytes(),
        &slashed_votes.to_le_bytes(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gas_discount_consensus_is_deterministic() {
        let report = validate_gas_discount_consensus(100_000, 80).unwrap();
        assert!(report.is_deterministic);
        assert_eq!(report.value, 60_000);
    }

    #[test]
    fn free_gas_consensus_is_deterministic() {
        let report = validate_free_gas(100).unwrap();
        assert_eq!(report.value, 200_000);
    }

    #[test]
    fn validator_seed_is_deterministic_given_same_inputs() {
        let tx_hash = [1u8; 32];
        let block_hash = [2u8; 32];
        let a = validate_validator_selection_seed(&tx_hash, &block_hash, 10).unwrap();
        let b = validate_validator_selection_seed(&tx_hash, &block_hash, 10).unwrap();
        assert_eq!(a.value, b.value);
    }

    #[test]
    fn trust_graph_state_hash_changes_with_inputs() {
        let a = trust_graph_state_hash(1, 2, 3, 0);
        let b = trust_graph_state_hash(1, 2, 3, 1);
        assert_ne!(a, b);
    }
}
