use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrustError {
    #[error("trust weight {0} is out of range [-100, 100], excluding 0")]
    WeightOutOfRange(i32),

    #[error("bond {bond} is insufficient for weight {weight} (requires at least {required})")]
    BondInsufficient { bond: u64, weight: i32, required: u64 },

    #[error("self-edges are forbidden")]
    SelfEdgeForbidden,

    #[error("a non-slashed edge already exists for this (from, to) pair")]
    DuplicateEdge,

    #[error("vote transaction already recorded")]
    DuplicateVote,

    #[error("vote transaction not found")]
    VoteNotFound,

    #[error("edge not found")]
    EdgeNotFound,

    #[error("storage error: {0}")]
    Storage(String),
}
