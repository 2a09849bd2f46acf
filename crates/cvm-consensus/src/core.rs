//! `ConsensusCore` — the single aggregate value an embedding node holds,
//! owning one instance of every subsystem and exposing its public entry
//! points. The node talks to one value instead of wiring each component
//! itself.

use crate::coinbase::{build_coinbase, Coinbase, TxFeeRecord};
use crate::error::ConsensusError;
use crate::router::{self, DeploymentReport, DeploymentRequest, ExecutionReport, ExecutionRequest};
use crate::safety;
use cvm_anomaly::AnomalyDetector;
use cvm_core::config::ConsensusConfig;
use cvm_core::event::EventLog;
use cvm_core::kv::KvStore;
use cvm_core::{Address, Hash32};
use cvm_dao::{Dispute, DisputeManager, DisputeResolution, PendingReward, VoteCommitment};
use cvm_resource::gc::{self, ContractRecord, StorageEntry, TrustCacheEntry};
use cvm_resource::RateLimiter;
use cvm_trust::{HatEngine, TrustEdge, TrustGraph};
use cvm_vm::detector::DetectorCache;
use cvm_vm::evm_host::EvmEngine;
use std::sync::Arc;
use tracing::info;

pub struct ConsensusCore<S: KvStore> {
    pub config: ConsensusConfig,
    pub trust: Arc<TrustGraph<S>>,
    pub hat: HatEngine<S>,
    pub dao: DisputeManager<S>,
    pub detector_cache: DetectorCache,
    pub anomaly: AnomalyDetector,
    pub rate_limiter: RateLimiter,
    pub events: EventLog,
    evm_engine: Option<Box<dyn EvmEngine + Send + Sync>>,
}

impl<S: KvStore> ConsensusCore<S> {
    pub fn new(store: Arc<S>, config: ConsensusConfig) -> Self {
        let trust = Arc::new(TrustGraph::new(store.clone(), config.trust_graph.clone()));
        let hat = HatEngine::new(trust.clone(), config.hat_weights.clone(), config.trust_graph.max_path_depth);
        let dao = DisputeManager::new(store, trust.clone(), config.dao.clone());
        Self {
            detector_cache: DetectorCache::new(config.detector.cache_capacity),
            anomaly: AnomalyDetector::new(config.anomaly.clone()),
            rate_limiter: RateLimiter::new(),
            events: EventLog::default(),
            trust,
            hat,
            dao,
            evm_engine: None,
            config,
        }
    }

    pub fn with_evm_engine(mut self, engine: Box<dyn EvmEngine + Send + Sync>) -> Self {
        self.evm_engine = Some(engine);
        self
    }

    pub fn execute(&self, req: &ExecutionRequest) -> Result<ExecutionReport, ConsensusError> {
        let engine: Option<&dyn EvmEngine> = self.evm_engine.as_ref().map(|b| &**b as &dyn EvmEngine);
        router::execute(req, &self.detector_cache, &self.config.detector, engine)
    }

    pub fn deploy(&self, req: &DeploymentRequest) -> Result<DeploymentReport, ConsensusError> {
        router::deploy(req, &self.detector_cache, &self.config.detector)
    }

    pub fn record_trust_edge(
        &self,
        from: Address,
        to: Address,
        weight: i32,
        bond: u64,
        bond_tx: Hash32,
        reason: String,
        established_at: u32,
        block_height: u64,
    ) -> Result<TrustEdge, cvm_trust::TrustError> {
        let edge = self.trust.add_edge(from, to, weight, bond, bond_tx, reason, established_at)?;
        self.events.record("trust_edge_added", format!("{} -> {}", from, to), block_height);
        Ok(edge)
    }

    pub fn submit_commitment(
        &self,
        dispute_id: u64,
        voter: Address,
        commitment_hash: Hash32,
        stake: u64,
        current_block: u32,
    ) -> Result<VoteCommitment, cvm_dao::DaoError> {
        let commitment = self.dao.submit_commitment(dispute_id, voter, commitment_hash, stake, current_block)?;
        self.events.record("dao_commitment", format!("dispute {dispute_id}"), current_block as u64);
        Ok(commitment)
    }

    pub fn reveal(
        &self,
        dispute_id: u64,
        voter: Address,
        vote: bool,
        nonce: [u8; 32],
        current_block: u32,
    ) -> Result<VoteCommitment, cvm_dao::DaoError> {
        let commitment = self.dao.reveal(dispute_id, voter, vote, nonce, current_block)?;
        self.events.record("dao_reveal", format!("dispute {dispute_id}"), current_block as u64);
        Ok(commitment)
    }

    pub fn resolve_dispute(&self, dispute_id: u64, current_block: u32) -> Result<DisputeResolution, cvm_dao::DaoError> {
        let forfeited = self.dao.forfeit_unrevealed(dispute_id)?;
        let resolution = self.dao.resolve(dispute_id, forfeited, current_block)?;
        info!(dispute_id, slash = resolution.slash_decision, "dispute resolved");
        self.events.record(
            "dao_resolved",
            format!("dispute {dispute_id} slash={}", resolution.slash_decision),
            current_block as u64,
        );
        Ok(resolution)
    }

    pub fn get_dispute(&self, id: u64) -> Option<Dispute> {
        self.dao.get_dispute(id)
    }

    pub fn rewards_for(&self, recipient: &Address) -> Vec<PendingReward> {
        self.dao.rewards_for(recipient)
    }

    pub fn split_coinbase(&self, block_reward: u64, tx_fees: &[TxFeeRecord]) -> Coinbase {
        build_coinbase(block_reward, tx_fees, &self.config.coinbase)
    }

    pub fn trust_graph_state_hash(&self, total_edges: u64, total_votes: u64, total_disputes: u64, slashed_votes: u64) -> Hash32 {
        safety::trust_graph_state_hash(total_edges, total_votes, total_disputes, slashed_votes)
    }

    /// Runs one GC pass: flags under-reputation deployers, sweeps expired
    /// storage, idle contracts, and stale trust-cache entries.
    pub fn run_gc_tick(
        &self,
        current_block: u64,
        now_secs: u64,
        storage_entries: &[StorageEntry],
        contracts: &[ContractRecord],
        trust_cache_entries: &[TrustCacheEntry<Vec<u8>>],
    ) -> GcReport {
        let expired_storage = gc::sweep_expired_storage(storage_entries, current_block);
        let idle_contracts = gc::sweep_idle_contracts(contracts, current_block, &self.config.resource);
        let stale_cache_entries = gc::sweep_trust_cache(trust_cache_entries, now_secs, &self.config.resource);

        info!(
            current_block,
            expired_storage = expired_storage.len(),
            idle_contracts = idle_contracts.len(),
            "gc tick complete"
        );
        self.events.record(
            "gc_tick",
            format!(
                "expired_storage={} idle_contracts={} stale_cache={}",
                expired_storage.len(),
                idle_contracts.len(),
                stale_cache_entries.len()
            ),
            current_block,
        );

        GcReport { expired_storage, idle_contracts, stale_cache_entries }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GcReport {
    pub expired_storage: Vec<Vec<u8>>,
    pub idle_contracts: Vec<Address>,
    pub stale_cache_entries: Vec<Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use cvm_core::kv::MemoryKvStore;

    fn core() -> ConsensusCore<MemoryKvStore> {
        ConsensusCore::new(Arc::new(MemoryKvStore::new()), ConsensusConfig::default())
    }

    #[test]
    fn record_trust_edge_appends_event() {
        let core = core();
        let from = Address([1u8; 20]);
        let to = Address([2u8; 20]);
        core.record_trust_edge(from, to, 50, 10_000, [0u8; 32], "test".into(), 1, 1).unwrap();
        assert_eq!(core.events.len(), 1);
    }

    #[test]
    fn split_coinbase_delegates_to_coinbase_module() {
        let core = core();
        let coinbase = core.split_coinbase(1_000, &[]);
        assert_eq!(coinbase.miner_payout, 1_000);
    }

    #[test]
    fn gc_tick_reports_and_records_event() {
        let core = core();
        let report = core.run_gc_tick(1_000_000, 1_000_000, &[], &[], &[]);
        assert!(report.expired_storage.is_empty());
        assert_eq!(core.events.len(), 1);
    }
}
