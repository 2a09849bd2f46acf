//! C10 — the coinbase gas-fee splitter: 70/30 miner/validator split per
//! transaction, folded into a single coinbase transaction per block.

use cvm_core::config::CoinbaseConfig;
use cvm_core::Address;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSplit {
    pub miner_share: u64,
    pub validator_share: u64,
    pub per_validator: u64,
    /// Integer-division remainder from `validator_share / |V|`, folded
    /// back into the miner's share so the split always sums exactly to
    /// `gas_cost`.
    pub remainder_to_miner: u64,
}

/// One transaction's `(gas_used, gas_cost)` plus the validator set that
/// covered it, as recorded by the gas-tracking side channel. Non-contract
/// transactions are skipped entirely by the caller before this is built.
pub struct TxFeeRecord {
    pub gas_used: u64,
    pub gas_cost: u64,
    pub validators: Vec<Address>,
}

pub fn gas_price(gas_used: u64, gas_cost: u64) -> u64 {
    if gas_used == 0 {
        return if gas_cost > 0 { 1 } else { 0 };
    }
    (gas_cost / gas_used).max(if gas_cost > 0 { 1 } else { 0 })
}

pub fn split_fee(gas_cost: u64, validator_count: usize, config: &CoinbaseConfig) -> FeeSplit {
    let miner_share_raw = (gas_cost as u128 * config.miner_share_bps as u128) / 10_000;
    let miner_share = miner_share_raw as u64;
    let validator_share = gas_cost - miner_share;

    if validator_count == 0 {
        return FeeSplit { miner_share: gas_cost, validator_share: 0, per_validator: 0, remainder_to_miner: 0 };
    }

    let per_validator = validator_share / validator_count as u64;
    let distributed = per_validator * validator_count as u64;
    let remainder_to_miner = validator_share - distributed;

    FeeSplit { miner_share, validator_share: distributed, per_validator, remainder_to_miner }
}

#[derive(Debug, Clone, Default)]
pub struct Coinbase {
    /// output 0
    pub miner_payout: u64,
    /// outputs 1..N, keyed by validator address, canonically ordered
    pub validator_payouts: BTreeMap<Address, u64>,
}

/// Builds the coinbase transaction for a block: output 0 pays the miner
/// `block_reward + tx_fees + sum(miner_share) - sum(validator_share)`;
/// outputs 1..N pay each validator its accumulated `per_validator` share
/// across every transaction it covered.
pub fn build_coinbase(
    block_reward: u64,
    tx_fees: &[TxFeeRecord],
    config: &CoinbaseConfig,
) -> Coinbase {
    let mut miner_total = block_reward;
    let mut validator_payouts: BTreeMap<Address, u64> = BTreeMap::new();

    for tx in tx_fees {
        miner_total += tx.gas_cost;
        let split = split_fee(tx.gas_cost, tx.validators.len(), config);
        // gas_cost already folded into miner_total above; now move the
        // validator_share back out of the miner and into per-validator
        // payouts, keeping the remainder with the miner.
        miner_total -= split.validator_share;
        for validator in &tx.validators {
            *validator_payouts.entry(*validator).or_insert(0) += split.per_validator;
        }
    }

    Coinbase { miner_payout: miner_total, validator_payouts }
}

/// Checks total coinbase output equals `block_reward + sum(tx_fees)`
/// within `config.rounding_tolerance` base units. Strict per-validator
/// verification is deferred: participation records for past blocks are
/// not guaranteed to be available when this check runs (open question,
/// see DESIGN.md), so only the aggregate total is enforced here.
pub fn check_coinbase_total(coinbase: &Coinbase, block_reward: u64, tx_fees: &[TxFeeRecord], config: &CoinbaseConfig) -> bool {
    let expected: u64 = block_reward + tx_fees.iter().map(|t| t.gas_cost).sum::<u64>();
    let actual: u64 = coinbase.miner_payout + coinbase.validator_payouts.values().sum::<u64>();
    let diff = if expected >= actual { expected - actual } else { actual - expected };
    diff <= config.rounding_tolerance
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_is_70_30_with_one_validator() {
        let cfg = CoinbaseConfig::default();
        let split = split_fee(1_000, 1, &cfg);
        assert_eq!(split.miner_share, 700);
        assert_eq!(split.per_validator, 300);
    }

    #[test]
    fn zero_validators_gives_miner_everything() {
        let cfg = CoinbaseConfig::default();
        let split = split_fee(1_000, 0, &cfg);
        assert_eq!(split.miner_share, 1_000);
        assert_eq!(split.validator_share, 0);
    }

    #[test]
    fn gas_fee_split_identity_holds() {
        let cfg = CoinbaseConfig::default();
        let split = split_fee(1_003, 3, &cfg);
        assert_eq!(split.miner_share + split.remainder_to_miner + split.per_validator * 3, 1_003);
    }

    #[test]
    fn coinbase_total_matches_block_reward_plus_fees() {
        let cfg = CoinbaseConfig::default();
        let v1 = Address([1u8; 20]);
        let v2 = Address([2u8; 20]);
        let fees = vec![TxFeeRecord { gas_used: 100, gas_cost: 1_000, validators: vec![v1, v2] }];
        let coinbase = build_coinbase(5_000, &fees, &cfg);
        assert!(check_coinbase_total(&coinbase, 5_000, &fees, &cfg));
    }
}
