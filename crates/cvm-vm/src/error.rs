use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum VmError {
    #[error("invalid bytecode: {0}")]
    InvalidBytecode(String),

    #[error("unsupported bytecode format")]
    UnsupportedFormat,

    #[error("out of gas")]
    OutOfGas,

    #[error("invalid opcode 0x{0:02x} at pc {1}")]
    InvalidOpcode(u8, usize),

    #[error("invalid jump target {0}")]
    InvalidJump(usize),

    #[error("stack underflow")]
    StackUnderflow,

    #[error("stack overflow")]
    StackOverflow,

    #[error("internal vm error: {0}")]
    VmInternal(String),
}
