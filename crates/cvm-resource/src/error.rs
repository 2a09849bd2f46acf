use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ResourceError {
    #[error("rate limit exceeded for {address} method {method}")]
    RateLimited { address: String, method: String },

    #[error("wall-time ceiling exceeded: {0}ms")]
    WallTimeExceeded(u64),
}
