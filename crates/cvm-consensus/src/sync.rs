//! Trust-graph peer sync message types. Wire transport is host-provided;
//! this module only defines the message shapes and the authority rule
//! for picking which peer supplies a delta.

use cvm_core::hash::Hash32;
use cvm_trust::TrustEdge;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustGraphStateRequest {
    pub request_id: u64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustGraphStateResponse {
    pub request_id: u64,
    pub state: Hash32,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustGraphDeltaRequest {
    pub request_id: u64,
    pub since_block: u64,
    pub since_state_hash: Hash32,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustGraphDeltaResponse {
    pub request_id: u64,
    pub from_block: u64,
    pub to_block: u64,
    pub edges: Vec<TrustEdge>,
    pub new_state_hash: Hash32,
    pub timestamp: i64,
}

/// A peer with a strictly newer `last_sync_block` wins authority to
/// supply the delta; ties keep the current authority (whichever peer is
/// already serving the request).
pub fn wins_delta_authority(candidate_last_sync_block: u64, current_last_sync_block: u64) -> bool {
    candidate_last_sync_block > current_last_sync_block
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strictly_newer_peer_wins_authority() {
        assert!(wins_delta_authority(10, 5));
        assert!(!wins_delta_authority(5, 5));
        assert!(!wins_delta_authority(4, 5));
    }
}
