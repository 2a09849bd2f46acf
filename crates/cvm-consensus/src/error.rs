use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConsensusError {
    #[error("invalid bytecode: {0}")]
    InvalidBytecode(String),

    #[error("unsupported bytecode format")]
    UnsupportedFormat,

    #[error("trust gate denied for operation {operation}, reputation {reputation}")]
    TrustGateDenied { operation: String, reputation: u32 },

    #[error("contract already exists at {0}")]
    ContractExists(String),

    #[error("max call depth exceeded")]
    MaxCallDepthExceeded,

    #[error("determinism failure in {0}")]
    DeterminismFailure(String),

    #[error("vm error: {0}")]
    Vm(String),
}

impl From<cvm_vm::VmError> for ConsensusError {
    fn from(e: cvm_vm::VmError) -> Self {
        ConsensusError::Vm(e.to_string())
    }
}
