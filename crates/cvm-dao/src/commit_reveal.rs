//! C4 — the commit-reveal vote lifecycle and dispute resolution / reward
//! distribution engine.

use crate::error::DaoError;
use crate::types::{dispute_phase, Dispute, DisputePhase, PendingReward, RewardKind, VoteCommitment};
use cvm_core::config::DaoConfig;
use cvm_core::hash::sha256_concat;
use cvm_core::kv::{join_key, KvStore};
use cvm_core::{codec, Address, Hash32};
use cvm_trust::TrustGraph;
use std::collections::BTreeMap;
use std::sync::Arc;

const DISPUTE_PREFIX: &[u8] = b"DISPUTE";
const COMMIT_PREFIX: &[u8] = b"COMMIT";
const REWARD_PREFIX: &[u8] = b"REWARD";
const REWARDS_BY_PREFIX: &[u8] = b"REWARDS_BY";

/// Outcome of resolving a dispute: which way it went, how much stake was
/// forfeited by non-revealers, the pending rewards created, and how much
/// was burned (burns have no recipient, so they are not `PendingReward`s;
/// see `DESIGN.md` for why).
#[derive(Debug, Clone)]
pub struct DisputeResolution {
    pub slash_decision: bool,
    pub forfeited_voter_stake: u64,
    pub rewards: Vec<PendingReward>,
    pub burned: u64,
}

pub struct DisputeManager<S: KvStore> {
    store: Arc<S>,
    trust: Arc<TrustGraph<S>>,
    config: DaoConfig,
}

impl<S: KvStore> DisputeManager<S> {
    pub fn new(store: Arc<S>, trust: Arc<TrustGraph<S>>, config: DaoConfig) -> Self {
        Self { store, trust, config }
    }

    fn dispute_key(id: u64) -> Vec<u8> {
        join_key(&[DISPUTE_PREFIX, &id.to_le_bytes()])
    }

    fn commit_key(dispute_id: u64, voter: &Address) -> Vec<u8> {
        join_key(&[COMMIT_PREFIX, &dispute_id.to_le_bytes(), &voter.0])
    }

    fn reward_key(reward_id: u64) -> Vec<u8> {
        join_key(&[REWARD_PREFIX, &reward_id.to_le_bytes()])
    }

    fn rewards_by_key(recipient: &Address) -> Vec<u8> {
        join_key(&[REWARDS_BY_PREFIX, &recipient.0])
    }

    pub fn get_dispute(&self, id: u64) -> Option<Dispute> {
        self.store.read(&Self::dispute_key(id)).and_then(|b| codec::decode(&b).ok())
    }

    fn write_dispute(&self, dispute: &Dispute) -> Result<(), DaoError> {
        let encoded = codec::encode(dispute).map_err(|e| DaoError::Storage(e.to_string()))?;
        self.store.write(&Self::dispute_key(dispute.id), &encoded);
        Ok(())
    }

    /// Opens a new dispute. `id` is supplied by the caller (derived from
    /// the challenging transaction's hash by the embedding node) so this
    /// crate does not need its own counter.
    pub fn open_dispute(
        &self,
        id: u64,
        original_vote_tx: Hash32,
        challenger: Address,
        challenge_bond: u64,
        reason: String,
        created_at: u32,
    ) -> Result<Dispute, DaoError> {
        let dispute = Dispute {
            id,
            original_vote_tx,
            challenger,
            challenge_bond,
            reason,
            created_at,
            commit_phase_start: created_at,
            reveal_phase_start: created_at + self.config.commit_phase_blocks,
            dao_votes: BTreeMap::new(),
            dao_stakes: BTreeMap::new(),
            resolved: false,
            slash_decision: false,
            resolved_at: None,
        };
        self.write_dispute(&dispute)?;
        Ok(dispute)
    }

    pub fn phase(&self, dispute: &Dispute, current_block: u32) -> DisputePhase {
        dispute_phase(dispute, current_block, self.config.commit_phase_blocks, self.config.reveal_phase_blocks)
    }

    pub fn submit_commitment(
        &self,
        dispute_id: u64,
        voter: Address,
        commitment_hash: Hash32,
        stake: u64,
        current_block: u32,
    ) -> Result<VoteCommitment, DaoError> {
        let dispute = self.get_dispute(dispute_id).ok_or(DaoError::DisputeNotFound)?;
        if self.phase(&dispute, current_block) != DisputePhase::Commit {
            return Err(DaoError::PhaseViolation);
        }
        if stake == 0 {
            return Err(DaoError::ZeroStake);
        }
        let key = Self::commit_key(dispute_id, &voter);
        if self.store.exists(&key) {
            return Err(DaoError::DuplicateCommitment);
        }

        let commitment = VoteCommitment {
            dispute_id,
            voter,
            commitment_hash,
            stake,
            commit_time: current_block,
            revealed: false,
            vote: None,
            nonce: None,
            reveal_time: None,
            forfeited: false,
        };
        let encoded = codec::encode(&commitment).map_err(|e| DaoError::Storage(e.to_string()))?;
        self.store.write(&key, &encoded);
        Ok(commitment)
    }

    fn get_commitment(&self, dispute_id: u64, voter: &Address) -> Option<VoteCommitment> {
        self.store.read(&Self::commit_key(dispute_id, voter)).and_then(|b| codec::decode(&b).ok())
    }

    fn write_commitment(&self, commitment: &VoteCommitment) -> Result<(), DaoError> {
        let key = Self::commit_key(commitment.dispute_id, &commitment.voter);
        let encoded = codec::encode(commitment).map_err(|e| DaoError::Storage(e.to_string()))?;
        self.store.write(&key, &encoded);
        Ok(())
    }

    /// `vote_byte` is `0x01` for slash, `0x00` for keep. Accepted iff
    /// `SHA256(vote_byte ∥ nonce)` equals the stored commitment hash.
    pub fn reveal(
        &self,
        dispute_id: u64,
        voter: Address,
        vote: bool,
        nonce: [u8; 32],
        current_block: u32,
    ) -> Result<VoteCommitment, DaoError> {
        let dispute = self.get_dispute(dispute_id).ok_or(DaoError::DisputeNotFound)?;
        if self.phase(&dispute, current_block) != DisputePhase::Reveal {
            return Err(DaoError::PhaseViolation);
        }
        let mut commitment = self.get_commitment(dispute_id, &voter).ok_or(DaoError::CommitmentNotFound)?;
        if commitment.forfeited {
            return Err(DaoError::AlreadyForfeited);
        }
        let vote_byte: u8 = if vote { 0x01 } else { 0x00 };
        let computed = sha256_concat(&[&[vote_byte], &nonce]);
        if computed != commitment.commitment_hash {
            return Err(DaoError::CommitmentMismatch);
        }

        commitment.revealed = true;
        commitment.vote = Some(vote);
        commitment.nonce = Some(nonce);
        commitment.reveal_time = Some(current_block);
        self.write_commitment(&commitment)?;

        let mut dispute = dispute;
        dispute.dao_votes.insert(voter, vote);
        dispute.dao_stakes.insert(voter, commitment.stake);
        self.write_dispute(&dispute)?;

        Ok(commitment)
    }

    /// Marks every unrevealed, non-forfeited commitment as forfeited.
    /// Returns the sum of forfeited stakes. Call at resolution entry,
    /// before [`Self::resolve`].
    pub fn forfeit_unrevealed(&self, dispute_id: u64) -> Result<u64, DaoError> {
        let dispute = self.get_dispute(dispute_id).ok_or(DaoError::DisputeNotFound)?;
        let prefix = join_key(&[COMMIT_PREFIX, &dispute_id.to_le_bytes()]);
        let mut total_forfeited = 0u64;
        for (_, value) in self.store.scan(&prefix) {
            let mut commitment: VoteCommitment = match codec::decode(&value) {
                Ok(c) => c,
                Err(_) => continue,
            };
            if !commitment.revealed && !commitment.forfeited {
                commitment.forfeited = true;
                total_forfeited += commitment.stake;
                self.write_commitment(&commitment)?;
            }
        }
        let _ = dispute;
        Ok(total_forfeited)
    }

    fn reward_id(dispute_id: u64, kind: RewardKind, recipient: &Address, seq: u32) -> u64 {
        let kind_tag: u8 = match kind {
            RewardKind::ChallengerBondReturn => 0,
            RewardKind::ChallengerBounty => 1,
            RewardKind::DaoVoterReward => 2,
            RewardKind::WronglyAccusedCompensation => 3,
        };
        let digest = sha256_concat(&[
            &dispute_id.to_le_bytes(),
            &[kind_tag],
            &recipient.0,
            &seq.to_le_bytes(),
        ]);
        u64::from_le_bytes(digest[..8].try_into().unwrap())
    }

    fn persist_reward(&self, reward: &PendingReward) -> Result<(), DaoError> {
        let encoded = codec::encode(reward).map_err(|e| DaoError::Storage(e.to_string()))?;
        self.store.write(&Self::reward_key(reward.reward_id), &encoded);
        let by_key = Self::rewards_by_key(&reward.recipient);
        let mut ids: Vec<u64> = self
            .store
            .read(&by_key)
            .and_then(|b| codec::decode(&b).ok())
            .unwrap_or_default();
        ids.push(reward.reward_id);
        let encoded_ids = codec::encode(&ids).map_err(|e| DaoError::Storage(e.to_string()))?;
        self.store.write(&by_key, &encoded_ids);
        Ok(())
    }

    /// Resolves a dispute: counts revealed votes weighted by stake,
    /// decides slash-vs-keep (ties favour the accused), and distributes
    /// rewards. Call `forfeit_unrevealed` first; its result is the
    /// `forfeited_voter_stake` value threaded through for bookkeeping —
    /// those stakes are burned outright and are *not* part of the
    /// `challenge_bond + slashed_bond` conservation identity, which
    /// concerns only the dispute's own bond pool.
    pub fn resolve(
        &self,
        dispute_id: u64,
        forfeited_voter_stake: u64,
        current_block: u32,
    ) -> Result<DisputeResolution, DaoError> {
        let mut dispute = self.get_dispute(dispute_id).ok_or(DaoError::DisputeNotFound)?;
        if dispute.resolved {
            return Err(DaoError::AlreadyResolved);
        }
        if self.phase(&dispute, current_block) != DisputePhase::Resolution {
            return Err(DaoError::PhaseViolation);
        }

        let mut slash_stake: u64 = 0;
        let mut keep_stake: u64 = 0;
        for (voter, &voted_slash) in dispute.dao_votes.iter() {
            let stake = *dispute.dao_stakes.get(voter).unwrap_or(&0);
            if voted_slash {
                slash_stake += stake;
            } else {
                keep_stake += stake;
            }
        }

        let has_quorum = dispute.dao_votes.len() as u32 >= self.config.min_votes;
        // Ties (and a missed quorum) favour the accused.
        let slash_decision = has_quorum && slash_stake > keep_stake;

        let mut rewards = Vec::new();
        let mut burned = forfeited_voter_stake;
        let mut seq = 0u32;

        if slash_decision {
            let original_vote = self.trust.get_vote(&dispute.original_vote_tx);
            let slashed_bond = original_vote.as_ref().map(|v| v.bond).unwrap_or(0);
            if let Some(vote) = &original_vote {
                self.trust
                    .slash_vote(vote.bond_tx, dispute_id_to_tx(dispute_id))
                    .map_err(|e| DaoError::Storage(e.to_string()))?;
            }

            let bond_return_amount = dispute.challenge_bond;
            seq += 1;
            rewards.push(self.new_reward(
                dispute_id,
                dispute.challenger,
                bond_return_amount,
                RewardKind::ChallengerBondReturn,
                current_block,
                seq,
            ));

            let bounty = slashed_bond * self.config.pct_challenger_bounty as u64 / 100;
            let voter_pool = slashed_bond * self.config.pct_voter_pool as u64 / 100;
            let burn_base = slashed_bond * self.config.pct_burn as u64 / 100;

            let winners: Vec<(Address, u64)> = dispute
                .dao_votes
                .iter()
                .filter(|(_, &v)| v)
                .map(|(addr, _)| (*addr, *dispute.dao_stakes.get(addr).unwrap_or(&0)))
                .collect();
            let winner_total_stake: u64 = winners.iter().map(|(_, s)| s).sum();

            seq += 1;
            rewards.push(self.new_reward(
                dispute_id,
                dispute.challenger,
                bounty,
                RewardKind::ChallengerBounty,
                current_block,
                seq,
            ));

            if winner_total_stake == 0 {
                // No revealed voters sided with the winning side: the
                // voter pool flows to the challenger instead of being
                // stranded.
                seq += 1;
                rewards.push(self.new_reward(
                    dispute_id,
                    dispute.challenger,
                    voter_pool,
                    RewardKind::ChallengerBounty,
                    current_block,
                    seq,
                ));
            } else {
                let mut distributed = 0u64;
                for (addr, stake) in &winners {
                    let share = (voter_pool as u128 * *stake as u128 / winner_total_stake as u128) as u64;
                    distributed += share;
                    seq += 1;
                    rewards.push(self.new_reward(
                        dispute_id,
                        *addr,
                        share,
                        RewardKind::DaoVoterReward,
                        current_block,
                        seq,
                    ));
                }
                burned += voter_pool - distributed;
            }

            let remainder = slashed_bond - bounty - voter_pool - burn_base;
            burned += burn_base + remainder;
        } else {
            let forfeited_bond = dispute.challenge_bond;
            let original_vote = self.trust.get_vote(&dispute.original_vote_tx);
            match original_vote {
                Some(vote) => {
                    let compensation = forfeited_bond * self.config.pct_wrongly_accused as u64 / 100;
                    seq += 1;
                    rewards.push(self.new_reward(
                        dispute_id,
                        vote.voter,
                        compensation,
                        RewardKind::WronglyAccusedCompensation,
                        current_block,
                        seq,
                    ));
                    burned += forfeited_bond - compensation;
                }
                None => {
                    burned += forfeited_bond;
                }
            }
        }

        for reward in &rewards {
            self.persist_reward(reward)?;
        }

        dispute.resolved = true;
        dispute.slash_decision = slash_decision;
        dispute.resolved_at = Some(current_block);
        self.write_dispute(&dispute)?;

        Ok(DisputeResolution { slash_decision, forfeited_voter_stake, rewards, burned })
    }

    fn new_reward(
        &self,
        dispute_id: u64,
        recipient: Address,
        amount: u64,
        kind: RewardKind,
        created_at: u32,
        seq: u32,
    ) -> PendingReward {
        PendingReward {
            reward_id: Self::reward_id(dispute_id, kind, &recipient, seq),
            dispute_id,
            recipient,
            amount,
            kind,
            created_at,
            claimed: false,
            claimed_at: None,
            claim_tx: None,
        }
    }

    /// Idempotent: a reward transitions unclaimed -> claimed exactly
    /// once, and only by its designated `recipient`; any later claim (by
    /// the recipient) returns zero. Anyone else's claim is rejected
    /// outright, since `reward_id` is a deterministic hash rather than a
    /// secret.
    pub fn claim(&self, reward_id: u64, recipient: Address, claim_tx: Hash32, current_block: u32) -> Result<u64, DaoError> {
        let key = Self::reward_key(reward_id);
        let mut reward: PendingReward = match self.store.read(&key).and_then(|b| codec::decode(&b).ok()) {
            Some(r) => r,
            None => return Ok(0),
        };
        if reward.recipient != recipient {
            return Err(DaoError::NotRecipient);
        }
        if reward.claimed {
            return Ok(0);
        }
        reward.claimed = true;
        reward.claimed_at = Some(current_block);
        reward.claim_tx = Some(claim_tx);
        let amount = reward.amount;
        let encoded = codec::encode(&reward).map_err(|e| DaoError::Storage(e.to_string()))?;
        self.store.write(&key, &encoded);
        Ok(amount)
    }

    pub fn rewards_for(&self, recipient: &Address) -> Vec<PendingReward> {
        let ids: Vec<u64> = self
            .store
            .read(&Self::rewards_by_key(recipient))
            .and_then(|b| codec::decode(&b).ok())
            .unwrap_or_default();
        ids.into_iter()
            .filter_map(|id| self.store.read(&Self::reward_key(id)))
            .filter_map(|b| codec::decode(&b).ok())
            .collect()
    }
}

/// Synthesises a deterministic "transaction hash" standing in for the
/// resolution transaction that triggers the slash, since this crate does
/// not see raw transactions.
fn dispute_id_to_tx(dispute_id: u64) -> Hash32 {
    sha256_concat(&[b"DAO_SLASH", &dispute_id.to_le_bytes()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use cvm_core::config::TrustGraphConfig;
    use cvm_core::kv::MemoryKvStore;
    use cvm_trust::required_bond;

    fn addr(b: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = b;
        Address(bytes)
    }

    fn setup() -> (DisputeManager<MemoryKvStore>, Arc<TrustGraph<MemoryKvStore>>) {
        let store = Arc::new(MemoryKvStore::new());
        let trust = Arc::new(TrustGraph::new(store.clone(), TrustGraphConfig::default()));
        let dao = DisputeManager::new(store, trust.clone(), DaoConfig::default());
        (dao, trust)
    }

    fn commitment_hash(vote: bool, nonce: &[u8; 32]) -> Hash32 {
        let byte = if vote { 0x01 } else { 0x00 };
        sha256_concat(&[&[byte], nonce])
    }

    #[test]
    fn commit_reveal_round_trip_and_mismatch_rejected() {
        let (dao, trust) = setup();
        let voter = addr(1);
        let target = addr(2);
        let bond = required_bond(&TrustGraphConfig::default(), 50);
        let vote = trust.record_vote(voter, target, 50, bond, [7; 32], "r".into(), 0).unwrap();

        let dispute = dao.open_dispute(1, vote.bond_tx, addr(3), 5_000, "bad vote".into(), 0).unwrap();
        let nonce = [42u8; 32];
        let hash = commitment_hash(true, &nonce);
        dao.submit_commitment(dispute.id, voter, hash, 100, 0).unwrap();

        // reveal before commit phase ends is a phase violation
        assert_eq!(
            dao.reveal(dispute.id, voter, true, nonce, 0).unwrap_err(),
            DaoError::PhaseViolation
        );

        let reveal_block = dispute.commit_phase_start + DaoConfig::default().commit_phase_blocks;
        assert_eq!(
            dao.reveal(dispute.id, voter, false, nonce, reveal_block).unwrap_err(),
            DaoError::CommitmentMismatch
        );
        let revealed = dao.reveal(dispute.id, voter, true, nonce, reveal_block).unwrap();
        assert!(revealed.revealed);
        assert_eq!(revealed.vote, Some(true));
    }

    #[test]
    fn scenario_s3_forfeit_and_slash_side_wins() {
        let (dao, trust) = setup();
        let target = addr(9);
        let voters: Vec<Address> = (1..=5).map(addr).collect();
        let stakes = [10u64, 20, 30, 50, 40];
        let votes_slash = [true, true, true, false]; // 5th never reveals

        let bond = required_bond(&TrustGraphConfig::default(), 20);
        let original_vote = trust.record_vote(voters[0], target, 20, bond, [1; 32], "".into(), 0).unwrap();

        let dispute = dao
            .open_dispute(42, original_vote.bond_tx, addr(99), 1_000, "".into(), 0)
            .unwrap();

        let mut nonces = vec![];
        for (i, voter) in voters.iter().enumerate() {
            let nonce = [i as u8 + 1; 32];
            nonces.push(nonce);
            let vote_choice = if i < 4 { votes_slash[i] } else { false };
            let hash = commitment_hash(vote_choice, &nonce);
            dao.submit_commitment(dispute.id, *voter, hash, stakes[i], 0).unwrap();
        }

        let reveal_block = dispute.commit_phase_start + DaoConfig::default().commit_phase_blocks;
        for i in 0..4 {
            dao.reveal(dispute.id, voters[i], votes_slash[i], nonces[i], reveal_block).unwrap();
        }
        // voters[4] never reveals

        let resolve_block = dispute.reveal_phase_start + DaoConfig::default().reveal_phase_blocks;
        let forfeited = dao.forfeit_unrevealed(dispute.id).unwrap();
        assert_eq!(forfeited, 40);

        let resolution = dao.resolve(dispute.id, forfeited, resolve_block).unwrap();
        assert!(resolution.slash_decision);
        assert_eq!(resolution.forfeited_voter_stake, 40);

        let voter_rewards: Vec<_> = resolution
            .rewards
            .iter()
            .filter(|r| r.kind == RewardKind::DaoVoterReward)
            .collect();
        assert_eq!(voter_rewards.len(), 3);
        let total_stake = 60u64;
        let voter_pool = bond * DaoConfig::default().pct_voter_pool as u64 / 100;
        for (i, voter) in voters[..3].iter().enumerate() {
            let expected = (voter_pool as u128 * stakes[i] as u128 / total_stake as u128) as u64;
            let got = voter_rewards.iter().find(|r| r.recipient == *voter).unwrap();
            assert_eq!(got.amount, expected);
        }
    }

    #[test]
    fn reward_conservation_on_slash() {
        let (dao, trust) = setup();
        let target = addr(2);
        let challenger = addr(3);
        let voter = addr(1);
        let bond = 10_000u64;
        let vote = trust.record_vote(voter, target, 80, bond, [5; 32], "".into(), 0).unwrap();
        let challenge_bond = 2_000u64;
        let dispute = dao.open_dispute(1, vote.bond_tx, challenger, challenge_bond, "".into(), 0).unwrap();

        let nonce = [3u8; 32];
        let hash = commitment_hash(true, &nonce);
        dao.submit_commitment(dispute.id, addr(50), hash, 1000, 0).unwrap();
        let reveal_block = dispute.commit_phase_start + DaoConfig::default().commit_phase_blocks;
        dao.reveal(dispute.id, addr(50), true, nonce, reveal_block).unwrap();

        let resolve_block = dispute.reveal_phase_start + DaoConfig::default().reveal_phase_blocks;
        let forfeited = dao.forfeit_unrevealed(dispute.id).unwrap();
        let resolution = dao.resolve(dispute.id, forfeited, resolve_block).unwrap();
        assert!(resolution.slash_decision);

        let rewards_total: u64 = resolution.rewards.iter().map(|r| r.amount).sum();
        assert_eq!(rewards_total + resolution.burned - resolution.forfeited_voter_stake, challenge_bond + bond);
    }

    #[test]
    fn claim_is_idempotent() {
        let (dao, trust) = setup();
        let target = addr(2);
        let voter = addr(1);
        let vote = trust.record_vote(voter, target, 50, 10_000, [5; 32], "".into(), 0).unwrap();
        let dispute = dao.open_dispute(1, vote.bond_tx, addr(3), 500, "".into(), 0).unwrap();
        let resolve_block = dispute.reveal_phase_start + DaoConfig::default().reveal_phase_blocks;
        dao.forfeit_unrevealed(dispute.id).unwrap();
        let resolution = dao.resolve(dispute.id, 0, resolve_block).unwrap();
        let reward = resolution.rewards.first().cloned();
        if let Some(reward) = reward {
            let first = dao.claim(reward.reward_id, reward.recipient, [1; 32], resolve_block).unwrap();
            assert_eq!(first, reward.amount);
            let second = dao.claim(reward.reward_id, reward.recipient, [2; 32], resolve_block).unwrap();
            assert_eq!(second, 0);
        }
    }

    #[test]
    fn claim_by_non_recipient_is_rejected() {
        let (dao, trust) = setup();
        let target = addr(2);
        let voter = addr(1);
        let vote = trust.record_vote(voter, target, 50, 10_000, [5; 32], "".into(), 0).unwrap();
        let dispute = dao.open_dispute(1, vote.bond_tx, addr(3), 500, "".into(), 0).unwrap();
        let resolve_block = dispute.reveal_phase_start + DaoConfig::default().reveal_phase_blocks;
        dao.forfeit_unrevealed(dispute.id).unwrap();
        let resolution = dao.resolve(dispute.id, 0, resolve_block).unwrap();
        let reward = resolution.rewards.first().cloned();
        if let Some(reward) = reward {
            let impostor = addr(99);
            assert_ne!(impostor, reward.recipient);
            let err = dao.claim(reward.reward_id, impostor, [1; 32], resolve_block).unwrap_err();
            assert_eq!(err, DaoError::NotRecipient);
        }
    }
}
