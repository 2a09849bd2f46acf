//! C8 — the execution router: detect format, gate on trust, adjust gas,
//! dispatch to the matching VM, then report reputation and metrics deltas
//! back to the caller (which owns applying them to persistent state).

use crate::error::ConsensusError;
use cvm_core::config::DetectorConfig;
use cvm_core::{Address, Word};
use cvm_trust::hat::{apply_gas_discount, trust_gate};
use cvm_vm::detector::{detect, validate, BytecodeFormat, DetectorCache, HYBRID_SEPARATOR};
use cvm_vm::evm_host::{EvmCallContext, EvmEngine};
use cvm_vm::interpreter::{execute as execute_native, CallContext, ExecutionEffects, Outcome};
use tracing::{info, warn};

pub const MAX_CALL_DEPTH: u32 = 1024;

pub struct ExecutionRequest<'a> {
    pub bytecode: &'a [u8],
    pub gas_limit: u64,
    pub contract: Address,
    pub caller: Address,
    pub value: Word,
    pub block_height: u64,
    pub block_hash: [u8; 32],
    pub timestamp: u64,
    pub reputation: u32,
    pub call_depth: u32,
    pub storage: &'a dyn Fn(&Address, &Word) -> Word,
    pub balance_of: &'a dyn Fn(&Address) -> Word,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReputationUpdate {
    Success,
    Failure,
}

#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub outcome: Outcome,
    pub gas_used: u64,
    pub gas_saved: u64,
    pub cross_format_hops: u32,
    pub reputation_update: ReputationUpdate,
    pub effects: ExecutionEffects,
}

/// Runs one call to completion. The caller supplies the already-computed
/// HAT reputation for `(caller, contract)`; the router does not compute
/// HAT itself (C3 owns that) so it can stay free of the trust graph's
/// storage dependency.
pub fn execute(
    req: &ExecutionRequest,
    cache: &DetectorCache,
    detector_config: &DetectorConfig,
    evm_engine: Option<&dyn EvmEngine>,
) -> Result<ExecutionReport, ConsensusError> {
    if req.call_depth > MAX_CALL_DEPTH {
        return Err(ConsensusError::MaxCallDepthExceeded);
    }

    let detection = cache.detect_cached(req.bytecode, detector_config);
    if !detection.is_valid || detection.format == BytecodeFormat::Unknown {
        warn!(reason = %detection.reason, "rejected call: unsupported bytecode format");
        return Err(ConsensusError::UnsupportedFormat);
    }

    if !trust_gate(req.reputation, "contract_execution") {
        warn!(reputation = req.reputation, contract = %req.contract, "trust gate denied contract execution");
        return Err(ConsensusError::TrustGateDenied {
            operation: "contract_execution".into(),
            reputation: req.reputation,
        });
    }

    let adjusted_gas = apply_gas_discount(req.gas_limit, req.reputation);
    let gas_saved = req.gas_limit - adjusted_gas;

    let (outcome, gas_used, effects, hops) = match detection.format {
        BytecodeFormat::Native => {
            let result = run_native(req.bytecode, req, adjusted_gas)?;
            (result.outcome, result.gas_used, result.effects, 0)
        }
        BytecodeFormat::Evm => {
            let engine = evm_engine.ok_or(ConsensusError::UnsupportedFormat)?;
            let result = run_evm(engine, req.bytecode, req, adjusted_gas)?;
            (result.0, result.1, ExecutionEffects::default(), 0)
        }
        BytecodeFormat::Hybrid => {
            let split = detection
                .hybrid_split
                .ok_or_else(|| ConsensusError::InvalidBytecode("hybrid split missing".into()))?;
            let native_part = &req.bytecode[..split];
            let evm_part = &req.bytecode[split + HYBRID_SEPARATOR.len()..];
            validate(native_part, BytecodeFormat::Native)
                .map_err(ConsensusError::InvalidBytecode)?;
            let native_result = run_native(native_part, req, adjusted_gas)?;
            let remaining_gas = adjusted_gas.saturating_sub(native_result.gas_used);
            let engine = evm_engine.ok_or(ConsensusError::UnsupportedFormat)?;
            let (evm_outcome, evm_gas) = run_evm(engine, evm_part, req, remaining_gas)?;
            let total_gas = native_result.gas_used + evm_gas;
            let final_outcome = match (&native_result.outcome, &evm_outcome) {
                (Outcome::Stopped, other) => other.clone(),
                (native_out, _) => native_out.clone(),
            };
            (final_outcome, total_gas, native_result.effects, 1)
        }
        BytecodeFormat::Unknown => unreachable!("filtered above"),
    };

    let reputation_update = match &outcome {
        Outcome::Returned(_) | Outcome::Stopped => ReputationUpdate::Success,
        Outcome::Reverted(_) => ReputationUpdate::Failure,
    };

    info!(
        contract = %req.contract,
        format = ?detection.format,
        gas_used,
        reputation_update = ?reputation_update,
        "contract call dispatched"
    );

    Ok(ExecutionReport { outcome, gas_used, gas_saved, cross_format_hops: hops, reputation_update, effects })
}

fn run_native(
    code: &[u8],
    req: &ExecutionRequest,
    gas_limit: u64,
) -> Result<cvm_vm::interpreter::ExecutionResult, ConsensusError> {
    let ctx = CallContext {
        address: req.contract,
        caller: req.caller,
        call_value: req.value,
        block_timestamp: req.timestamp,
        block_height: req.block_height,
        block_hash: req.block_hash,
        gas_limit,
        storage: req.storage,
        balance_of: req.balance_of,
        call_depth: req.call_depth,
        max_call_depth: MAX_CALL_DEPTH,
    };
    Ok(execute_native(code, &ctx)?)
}

fn run_evm(
    engine: &dyn EvmEngine,
    code: &[u8],
    req: &ExecutionRequest,
    gas_limit: u64,
) -> Result<(Outcome, u64), ConsensusError> {
    let ctx = EvmCallContext {
        address: req.contract,
        caller: req.caller,
        call_value: req.value,
        block_timestamp: req.timestamp,
        block_height: req.block_height,
        gas_limit,
        is_create: false,
        salt: None,
        deployer_nonce: 0,
    };
    let result = engine.execute(code, &ctx).map_err(|e| ConsensusError::Vm(e.to_string()))?;
    let outcome = if result.success {
        Outcome::Returned(result.return_data)
    } else {
        Outcome::Reverted(result.return_data)
    };
    Ok((outcome, result.gas_used))
}

pub struct DeploymentRequest<'a> {
    pub init_code: &'a [u8],
    pub deployer: Address,
    pub deployer_reputation: u32,
    pub deployer_nonce: u64,
    pub gas_limit: u64,
    pub block_height: u64,
    pub block_hash: [u8; 32],
    pub timestamp: u64,
    pub contract_exists: &'a dyn Fn(&Address) -> bool,
    pub storage: &'a dyn Fn(&Address, &Word) -> Word,
    pub balance_of: &'a dyn Fn(&Address) -> Word,
}

#[derive(Debug, Clone)]
pub struct DeploymentReport {
    pub address: Address,
    pub runtime_code: Vec<u8>,
    pub gas_used: u64,
}

/// Treats `init_code` as constructor bytecode: its `RETURN` buffer becomes
/// the persisted runtime code.
pub fn deploy(
    req: &DeploymentRequest,
    cache: &DetectorCache,
    detector_config: &DetectorConfig,
) -> Result<DeploymentReport, ConsensusError> {
    let detection = cache.detect_cached(req.init_code, detector_config);
    if !detection.is_valid {
        return Err(ConsensusError::InvalidBytecode(detection.reason));
    }
    if req.init_code.len() > cvm_vm::opcodes::MAX_BYTECODE_SIZE {
        return Err(ConsensusError::InvalidBytecode("init code exceeds size ceiling".into()));
    }
    if !trust_gate(req.deployer_reputation, "deployment") {
        return Err(ConsensusError::TrustGateDenied {
            operation: "deployment".into(),
            reputation: req.deployer_reputation,
        });
    }

    let address = cvm_vm::evm_host::derive_create_address(&req.deployer, req.deployer_nonce);
    if (req.contract_exists)(&address) {
        warn!(address = %address, "deployment rejected: address already occupied");
        return Err(ConsensusError::ContractExists(address.to_string()));
    }

    let exec_req = ExecutionRequest {
        bytecode: req.init_code,
        gas_limit: req.gas_limit,
        contract: address,
        caller: req.deployer,
        value: Word::ZERO,
        block_height: req.block_height,
        block_hash: req.block_hash,
        timestamp: req.timestamp,
        reputation: req.deployer_reputation,
        call_depth: 0,
        storage: req.storage,
        balance_of: req.balance_of,
    };
    let report = execute(&exec_req, cache, detector_config, None)?;
    let runtime_code = match report.outcome {
        Outcome::Returned(data) => data,
        Outcome::Stopped => Vec::new(),
        Outcome::Reverted(_) => return Err(ConsensusError::InvalidBytecode("constructor reverted".into())),
    };

    info!(address = %address, gas_used = report.gas_used, "contract deployed");
    Ok(DeploymentReport { address, runtime_code, gas_used: report.gas_used })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cvm_vm::opcodes::*;

    fn no_storage(_: &Address, _: &Word) -> Word {
        Word::ZERO
    }
    fn no_balance(_: &Address) -> Word {
        Word::ZERO
    }
    fn never_exists(_: &Address) -> bool {
        false
    }

    #[test]
    fn s1_native_push_add_sstore_runs_to_completion() {
        let code = vec![0x01, 0x02, 0x01, 0x03, OP_ADD, 0x01, 0x00, OP_SSTORE, OP_STOP];
        let req = ExecutionRequest {
            bytecode: &code,
            gas_limit: 1_000_000,
            contract: Address::ZERO,
            caller: Address::ZERO,
            value: Word::ZERO,
            block_height: 1,
            block_hash: [0u8; 32],
            timestamp: 0,
            reputation: 80,
            call_depth: 0,
            storage: &no_storage,
            balance_of: &no_balance,
        };
        let cache = DetectorCache::new(10);
        let cfg = DetectorConfig::default();
        let report = execute(&req, &cache, &cfg, None).unwrap();
        assert_eq!(report.outcome, Outcome::Stopped);
        assert_eq!(report.reputation_update, ReputationUpdate::Success);
        assert_eq!(report.effects.storage_writes.get(&Word::from_u64(0)), Some(&Word::from_u64(5)));
        assert_eq!(report.gas_used, 212);
    }

    #[test]
    fn low_reputation_denied_by_trust_gate() {
        let code = vec![OP_STOP];
        let req = ExecutionRequest {
            bytecode: &code,
            gas_limit: 1_000,
            contract: Address::ZERO,
            caller: Address::ZERO,
            value: Word::ZERO,
            block_height: 1,
            block_hash: [0u8; 32],
            timestamp: 0,
            reputation: 0,
            call_depth: 0,
            storage: &no_storage,
            balance_of: &no_balance,
        };
        let cache = DetectorCache::new(10);
        let cfg = DetectorConfig::default();
        let err = execute(&req, &cache, &cfg, None).unwrap_err();
        assert!(matches!(err, ConsensusError::TrustGateDenied { .. }));
    }

    #[test]
    fn deploy_computes_address_and_persists_runtime_code() {
        // constructor returns empty runtime code by simply stopping
        let init_code = vec![OP_STOP];
        let req = DeploymentRequest {
            init_code: &init_code,
            deployer: Address([9u8; 20]),
            deployer_reputation: 60,
            deployer_nonce: 0,
            gas_limit: 100_000,
            block_height: 1,
            block_hash: [0u8; 32],
            timestamp: 0,
            contract_exists: &never_exists,
            storage: &no_storage,
            balance_of: &no_balance,
        };
        let cache = DetectorCache::new(10);
        let cfg = DetectorConfig::default();
        let report = deploy(&req, &cache, &cfg).unwrap();
        assert!(report.runtime_code.is_empty());
    }

    #[test]
    fn call_depth_beyond_limit_rejected() {
        let code = vec![OP_STOP];
        let req = ExecutionRequest {
            bytecode: &code,
            gas_limit: 1_000,
            contract: Address::ZERO,
            caller: Address::ZERO,
            value: Word::ZERO,
            block_height: 1,
            block_hash: [0u8; 32],
            timestamp: 0,
            reputation: 80,
            call_depth: MAX_CALL_DEPTH + 1,
            storage: &no_storage,
            balance_of: &no_balance,
        };
        let cache = DetectorCache::new(10);
        let cfg = DetectorConfig::default();
        let err = execute(&req, &cache, &cfg, None).unwrap_err();
        assert_eq!(err, ConsensusError::MaxCallDepthExceeded);
    }
}
