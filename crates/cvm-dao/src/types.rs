//! Persisted entities for the commit-reveal DAO.

use cvm_core::{Address, Hash32};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCommitment {
    pub dispute_id: u64,
    pub voter: Address,
    pub commitment_hash: Hash32,
    pub stake: u64,
    pub commit_time: u32,
    pub revealed: bool,
    pub vote: Option<bool>,
    pub nonce: Option<[u8; 32]>,
    pub reveal_time: Option<u32>,
    pub forfeited: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispute {
    pub id: u64,
    pub original_vote_tx: Hash32,
    pub challenger: Address,
    pub challenge_bond: u64,
    pub reason: String,
    pub created_at: u32,
    pub commit_phase_start: u32,
    pub reveal_phase_start: u32,
    pub dao_votes: BTreeMap<Address, bool>,
    pub dao_stakes: BTreeMap<Address, u64>,
    pub resolved: bool,
    pub slash_decision: bool,
    pub resolved_at: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RewardKind {
    ChallengerBondReturn,
    ChallengerBounty,
    DaoVoterReward,
    WronglyAccusedCompensation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingReward {
    pub reward_id: u64,
    pub dispute_id: u64,
    pub recipient: Address,
    pub amount: u64,
    pub kind: RewardKind,
    pub created_at: u32,
    pub claimed: bool,
    pub claimed_at: Option<u32>,
    pub claim_tx: Option<Hash32>,
}

/// Which phase the dispute is currently in, given `current_block` and the
/// fixed commit/reveal durations from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisputePhase {
    Commit,
    Reveal,
    Resolution,
}

pub fn dispute_phase(dispute: &Dispute, current_block: u32, commit_blocks: u32, reveal_blocks: u32) -> DisputePhase {
    if current_block < dispute.commit_phase_start + commit_blocks {
        DisputePhase::Commit
    } else if current_block < dispute.reveal_phase_start + reveal_blocks {
        DisputePhase::Reveal
    } else {
        DisputePhase::Resolution
    }
}
