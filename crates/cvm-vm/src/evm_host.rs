//! C7 — the seam between this VM and an externally supplied EVM
//! execution engine. This crate never implements an EVM interpreter
//! itself; it defines the trait boundary the router (C8) calls through
//! and the access-list bookkeeping that boundary needs.

use cvm_core::hash::sha256;
use cvm_core::{Address, Word};
use std::collections::HashSet;

/// Implemented by whatever EVM engine a node embeds. The router treats
/// this as a black box: given EVM bytecode and a call context, run it and
/// report back an outcome in the same shape the native interpreter uses.
pub trait EvmEngine {
    fn execute(&self, bytecode: &[u8], ctx: &EvmCallContext) -> Result<EvmExecutionResult, EvmHostError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum EvmHostError {
    #[error("evm engine rejected bytecode: {0}")]
    Rejected(String),
    #[error("evm engine ran out of gas")]
    OutOfGas,
    #[error("evm engine internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone)]
pub struct EvmCallContext {
    pub address: Address,
    pub caller: Address,
    pub call_value: Word,
    pub block_timestamp: u64,
    pub block_height: u64,
    pub gas_limit: u64,
    pub is_create: bool,
    /// `CREATE2`-style salt, when present; `None` selects classic
    /// nonce-based `CREATE` address derivation.
    pub salt: Option<[u8; 32]>,
    pub deployer_nonce: u64,
}

#[derive(Debug, Clone)]
pub struct EvmExecutionResult {
    pub success: bool,
    pub return_data: Vec<u8>,
    pub gas_used: u64,
}

/// Access-list (cold/warm) tracking for a single top-level transaction,
/// shared across however many nested EVM calls it makes. First touch of
/// any address or storage slot is cold (full gas cost); every touch after
/// that within the same transaction is warm (discounted).
#[derive(Debug, Default)]
pub struct AccessList {
    warm_addresses: HashSet<Address>,
    warm_slots: HashSet<(Address, Word)>,
}

pub enum AccessCost {
    Cold,
    Warm,
}

impl AccessList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn touch_address(&mut self, addr: Address) -> AccessCost {
        if self.warm_addresses.insert(addr) {
            AccessCost::Cold
        } else {
            AccessCost::Warm
        }
    }

    pub fn touch_slot(&mut self, addr: Address, slot: Word) -> AccessCost {
        if self.warm_slots.insert((addr, slot)) {
            AccessCost::Cold
        } else {
            AccessCost::Warm
        }
    }
}

/// Classic `CREATE`: address derived from `sha256(deployer || nonce)`,
/// truncated to 20 bytes. This chain has no RLP; nonce is encoded as an
/// 8-byte big-endian integer instead.
pub fn derive_create_address(deployer: &Address, nonce: u64) -> Address {
    let digest = sha256(&[deployer.as_bytes().as_slice(), &nonce.to_be_bytes()].concat());
    Address::truncate_from_hash(&digest)
}

/// `CREATE2`: address derived from `sha256(0xff || deployer || salt ||
/// sha256(init_code))`, matching the EVM `CREATE2` formula's structure
/// with SHA-256 standing in for Keccak.
pub fn derive_create2_address(deployer: &Address, salt: &[u8; 32], init_code: &[u8]) -> Address {
    let init_hash = sha256(init_code);
    let digest = sha256(
        &[
            &[0xffu8][..],
            deployer.as_bytes().as_slice(),
            salt.as_slice(),
            init_hash.as_slice(),
        ]
        .concat(),
    );
    Address::truncate_from_hash(&digest)
}

pub fn derive_contract_address(ctx: &EvmCallContext, deployer: &Address, init_code: &[u8]) -> Address {
    match ctx.salt {
        Some(salt) => derive_create2_address(deployer, &salt, init_code),
        None => derive_create_address(deployer, ctx.deployer_nonce),
    }
}

/// A deterministic reference implementation of [`EvmEngine`]: charges a
/// flat per-byte gas cost and returns the input bytecode unexecuted as
/// "return data". Not a real EVM — it exists so the router and
/// `ConsensusCore` are exercisable end to end without an embedding node
/// supplying its own engine, and so tests of the EVM/HYBRID dispatch path
/// don't need one either.
pub struct NullEvmEngine {
    pub gas_per_byte: u64,
}

impl Default for NullEvmEngine {
    fn default() -> Self {
        Self { gas_per_byte: 1 }
    }
}

impl EvmEngine for NullEvmEngine {
    fn execute(&self, bytecode: &[u8], ctx: &EvmCallContext) -> Result<EvmExecutionResult, EvmHostError> {
        let gas_used = (bytecode.len() as u64).saturating_mul(self.gas_per_byte);
        if gas_used > ctx.gas_limit {
            return Err(EvmHostError::OutOfGas);
        }
        Ok(EvmExecutionResult { success: true, return_data: bytecode.to_vec(), gas_used })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_address_is_deterministic() {
        let deployer = Address([1u8; 20]);
        let a = derive_create_address(&deployer, 5);
        let b = derive_create_address(&deployer, 5);
        assert_eq!(a, b);
    }

    #[test]
    fn create_address_varies_with_nonce() {
        let deployer = Address([1u8; 20]);
        let a = derive_create_address(&deployer, 5);
        let b = derive_create_address(&deployer, 6);
        assert_ne!(a, b);
    }

    #[test]
    fn create2_address_varies_with_salt() {
        let deployer = Address([1u8; 20]);
        let code = b"init";
        let a = derive_create2_address(&deployer, &[0u8; 32], code);
        let b = derive_create2_address(&deployer, &[1u8; 32], code);
        assert_ne!(a, b);
    }

    #[test]
    fn access_list_reports_cold_then_warm() {
        let mut list = AccessList::new();
        let addr = Address([2u8; 20]);
        assert!(matches!(list.touch_address(addr), AccessCost::Cold));
        assert!(matches!(list.touch_address(addr), AccessCost::Warm));
    }

    #[test]
    fn null_engine_charges_gas_and_returns_input() {
        let engine = NullEvmEngine::default();
        let ctx = EvmCallContext {
            address: Address::ZERO,
            caller: Address::ZERO,
            call_value: Word::ZERO,
            block_timestamp: 0,
            block_height: 0,
            gas_limit: 100,
            is_create: false,
            salt: None,
            deployer_nonce: 0,
        };
        let result = engine.execute(&[1, 2, 3], &ctx).unwrap();
        assert_eq!(result.gas_used, 3);
        assert_eq!(result.return_data, vec![1, 2, 3]);
    }
}
