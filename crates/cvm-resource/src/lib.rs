//! Reputation-tiered resource limits and garbage collection (C12).

pub mod error;
pub mod gc;
pub mod rate_limit;
pub mod tiers;

pub use error::ResourceError;
pub use rate_limit::RateLimiter;
pub use tiers::{Tier, TierLimits};
