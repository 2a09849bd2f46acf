//! Commit-reveal DAO disputes and reward distribution (C4).

pub mod commit_reveal;
pub mod error;
pub mod types;

pub use commit_reveal::{DisputeManager, DisputeResolution};
pub use error::DaoError;
pub use types::{Dispute, DisputePhase, PendingReward, RewardKind, VoteCommitment};
