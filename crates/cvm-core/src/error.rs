//! Shared error kinds for the KV layer. Downstream crates define their own
//! `thiserror` enums (trust graph, DAO, VM, router...) and convert into
//! these only at the storage boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("storage write failed: {0}")]
    StorageWriteFail(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("value at key was not found")]
    NotFound,

    #[error("internal consistency violation: {0}")]
    Invariant(String),
}
