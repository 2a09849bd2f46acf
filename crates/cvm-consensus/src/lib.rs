//! Execution router, consensus safety validator, coinbase gas-fee
//! splitter, and peer-sync message shapes (C8, C9, C10).

pub mod coinbase;
pub mod core;
pub mod error;
pub mod router;
pub mod safety;
pub mod sync;

pub use coinbase::{build_coinbase, check_coinbase_total, gas_price, split_fee, Coinbase, FeeSplit, TxFeeRecord};
pub use core::{ConsensusCore, GcReport};
pub use error::ConsensusError;
pub use router::{deploy, execute, DeploymentReport, DeploymentRequest, ExecutionReport, ExecutionRequest, ReputationUpdate, MAX_CALL_DEPTH};
pub use safety::{
    trust_graph_state_hash, validate_determinism, validate_free_gas, validate_gas_discount_consensus,
    validate_validator_selection_seed, DeterminismReport,
};
