//! C12 cleanup/GC: flagging under-reputation deployers, sweeping idle
//! contracts and expired storage, and evicting stale trust-graph cache
//! entries.

use cvm_core::config::ResourceConfig;
use cvm_core::Address;

pub fn should_flag_deployer(deployer_reputation: u32, config: &ResourceConfig) -> bool {
    deployer_reputation < config.min_deploy_reputation
}

/// The inactivity bound (in blocks) a contract is allowed to sit idle
/// before GC reclaims it, scaled by its deployer's reputation.
pub fn inactivity_bound_blocks(deployer_reputation: u32, config: &ResourceConfig) -> u64 {
    if deployer_reputation < config.min_deploy_reputation {
        config.low_rep_inactivity_blocks
    } else if deployer_reputation >= 90 {
        config.high_rep_inactivity_blocks
    } else {
        config.normal_inactivity_blocks
    }
}

pub struct StorageEntry {
    pub key: Vec<u8>,
    pub expires_at_block: Option<u64>,
}

pub fn sweep_expired_storage(entries: &[StorageEntry], current_block: u64) -> Vec<Vec<u8>> {
    entries
        .iter()
        .filter(|e| matches!(e.expires_at_block, Some(expiry) if expiry <= current_block))
        .map(|e| e.key.clone())
        .collect()
}

pub struct ContractRecord {
    pub address: Address,
    pub deployer_reputation: u32,
    pub last_active_block: u64,
}

pub fn sweep_idle_contracts(contracts: &[ContractRecord], current_block: u64, config: &ResourceConfig) -> Vec<Address> {
    contracts
        .iter()
        .filter(|c| {
            let bound = inactivity_bound_blocks(c.deployer_reputation, config);
            current_block.saturating_sub(c.last_active_block) > bound
        })
        .map(|c| c.address)
        .collect()
}

pub struct TrustCacheEntry<K> {
    pub key: K,
    pub inserted_at_secs: u64,
}

pub fn sweep_trust_cache<K: Clone>(entries: &[TrustCacheEntry<K>], now_secs: u64, config: &ResourceConfig) -> Vec<K> {
    entries
        .iter()
        .filter(|e| now_secs.saturating_sub(e.inserted_at_secs) > config.trust_cache_ttl_secs)
        .map(|e| e.key.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactivity_bound_scales_with_reputation() {
        let cfg = ResourceConfig::default();
        assert_eq!(inactivity_bound_blocks(10, &cfg), cfg.low_rep_inactivity_blocks);
        assert_eq!(inactivity_bound_blocks(50, &cfg), cfg.normal_inactivity_blocks);
        assert_eq!(inactivity_bound_blocks(95, &cfg), cfg.high_rep_inactivity_blocks);
    }

    #[test]
    fn expired_storage_entries_are_swept() {
        let entries = vec![
            StorageEntry { key: b"a".to_vec(), expires_at_block: Some(10) },
            StorageEntry { key: b"b".to_vec(), expires_at_block: Some(100) },
            StorageEntry { key: b"c".to_vec(), expires_at_block: None },
        ];
        let swept = sweep_expired_storage(&entries, 50);
        assert_eq!(swept, vec![b"a".to_vec()]);
    }

    #[test]
    fn idle_contracts_beyond_bound_are_swept() {
        let cfg = ResourceConfig::default();
        let contracts = vec![
            ContractRecord { address: Address([1u8; 20]), deployer_reputation: 10, last_active_block: 0 },
            ContractRecord { address: Address([2u8; 20]), deployer_reputation: 95, last_active_block: 0 },
        ];
        let swept = sweep_idle_contracts(&contracts, cfg.low_rep_inactivity_blocks + 1, &cfg);
        assert_eq!(swept, vec![Address([1u8; 20])]);
    }

    #[test]
    fn trust_cache_entries_older_than_24h_swept() {
        let cfg = ResourceConfig::default();
        let entries = vec![
            TrustCacheEntry { key: "stale", inserted_at_secs: 0 },
            TrustCacheEntry { key: "fresh", inserted_at_secs: 90_000 },
        ];
        let swept = sweep_trust_cache(&entries, 100_000, &cfg);
        assert_eq!(swept, vec!["stale"]);
    }
}
