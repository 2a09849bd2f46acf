//! Bytecode format detection, the native interpreter, and the EVM host
//! adapter boundary (C5, C6, C7).

pub mod detector;
pub mod error;
pub mod evm_host;
pub mod interpreter;
pub mod opcodes;

pub use detector::{detect, BytecodeFormat, DetectionResult, DetectorCache};
pub use error::VmError;
pub use evm_host::{EvmCallContext, EvmEngine, EvmExecutionResult, EvmHostError, NullEvmEngine};
pub use interpreter::{execute, CallContext, ExecutionEffects, ExecutionResult, Outcome};
