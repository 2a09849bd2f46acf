//! Web-of-trust graph (C2) and the HAT score engine (C3).

pub mod error;
pub mod graph;
pub mod hat;

pub use error::TrustError;
pub use graph::{required_bond, BondedVote, TrustEdge, TrustGraph, TrustPath};
pub use hat::{
    apply_gas_discount, behaviour_score, economic_score, free_gas_allowance, temporal_score,
    trust_gate, trust_threshold, BehaviorMetrics, HatBreakdown, HatEngine, StakeInfo, TemporalMetrics,
};
