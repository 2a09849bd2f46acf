use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DaoError {
    #[error("dispute not found")]
    DisputeNotFound,

    #[error("commitment not found")]
    CommitmentNotFound,

    #[error("commitment already submitted for this (dispute, voter) pair")]
    DuplicateCommitment,

    #[error("stake must be non-zero")]
    ZeroStake,

    #[error("operation not valid in the current phase")]
    PhaseViolation,

    #[error("revealed hash does not match the stored commitment")]
    CommitmentMismatch,

    #[error("commitment was forfeited and can no longer be revealed")]
    AlreadyForfeited,

    #[error("dispute has already been resolved")]
    AlreadyResolved,

    #[error("caller is not this reward's recipient")]
    NotRecipient,

    #[error("storage error: {0}")]
    Storage(String),
}
