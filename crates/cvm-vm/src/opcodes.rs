//! The native opcode table and its gas schedule. Shared by the detector
//! (which needs to recognise the byte layout without executing it) and
//! the interpreter (which executes it).

/// `PUSH` opcodes occupy the low byte range `0x01..=0x20`; the opcode
/// byte *is* the immediate length in `[1, 32]`. Everything else is a
/// single fixed opcode byte, optionally with a 1-byte immediate for
/// `DUP`/`SWAP` depth.
pub const OP_STOP: u8 = 0x00;
pub const OP_PUSH_MIN: u8 = 0x01;
pub const OP_PUSH_MAX: u8 = 0x20;
pub const OP_POP: u8 = 0x21;
pub const OP_DUP: u8 = 0x22;
pub const OP_SWAP: u8 = 0x23;
pub const OP_ADD: u8 = 0x24;
pub const OP_SUB: u8 = 0x25;
pub const OP_MUL: u8 = 0x26;
pub const OP_DIV: u8 = 0x27;
pub const OP_MOD: u8 = 0x28;
pub const OP_AND: u8 = 0x29;
pub const OP_OR: u8 = 0x2a;
pub const OP_XOR: u8 = 0x2b;
pub const OP_NOT: u8 = 0x2c;
pub const OP_EQ: u8 = 0x2d;
pub const OP_NE: u8 = 0x2e;
pub const OP_LT: u8 = 0x2f;
pub const OP_GT: u8 = 0x30;
pub const OP_LE: u8 = 0x31;
pub const OP_GE: u8 = 0x32;
pub const OP_JUMP: u8 = 0x33;
pub const OP_JUMPI: u8 = 0x34;
pub const OP_RETURN: u8 = 0x35;
pub const OP_REVERT: u8 = 0x36;
pub const OP_SLOAD: u8 = 0x37;
pub const OP_SSTORE: u8 = 0x38;
pub const OP_SHA256: u8 = 0x39;
pub const OP_VERIFY_SIG: u8 = 0x3a;
pub const OP_VERIFY_SIG_ECDSA: u8 = 0x3b;
pub const OP_VERIFY_SIG_QUANTUM: u8 = 0x3c;
pub const OP_ADDRESS: u8 = 0x3d;
pub const OP_CALLER: u8 = 0x3e;
pub const OP_CALLVALUE: u8 = 0x3f;
pub const OP_TIMESTAMP: u8 = 0x40;
pub const OP_BLOCKHASH: u8 = 0x41;
pub const OP_BLOCKHEIGHT: u8 = 0x42;
pub const OP_GAS: u8 = 0x43;
pub const OP_BALANCE: u8 = 0x44;
pub const OP_LOG: u8 = 0x45;
pub const OP_CALL: u8 = 0x46;

/// Size of any instruction's immediate operand, in bytes, given its
/// opcode byte. `PUSH(n)` reads `n` bytes; `DUP`/`SWAP` read one byte
/// (the depth); everything else has no immediate.
pub fn immediate_len(opcode: u8) -> usize {
    if (OP_PUSH_MIN..=OP_PUSH_MAX).contains(&opcode) {
        opcode as usize
    } else if opcode == OP_DUP || opcode == OP_SWAP {
        1
    } else {
        0
    }
}

pub fn is_known_opcode(opcode: u8) -> bool {
    matches!(opcode,
        OP_STOP | OP_POP | OP_DUP | OP_SWAP | OP_ADD | OP_SUB | OP_MUL | OP_DIV | OP_MOD
        | OP_AND | OP_OR | OP_XOR | OP_NOT | OP_EQ | OP_NE | OP_LT | OP_GT | OP_LE | OP_GE
        | OP_JUMP | OP_JUMPI | OP_RETURN | OP_REVERT | OP_SLOAD | OP_SSTORE | OP_SHA256
        | OP_VERIFY_SIG | OP_VERIFY_SIG_ECDSA | OP_VERIFY_SIG_QUANTUM | OP_ADDRESS | OP_CALLER
        | OP_CALLVALUE | OP_TIMESTAMP | OP_BLOCKHASH | OP_BLOCKHEIGHT | OP_GAS | OP_BALANCE
        | OP_LOG | OP_CALL
    ) || (OP_PUSH_MIN..=OP_PUSH_MAX).contains(&opcode)
}

/// Whether this opcode's control flow is a jump (affects how the
/// interpreter advances `pc` and how the detector/validator checks jump
/// destinations).
pub fn is_jump(opcode: u8) -> bool {
    opcode == OP_JUMP || opcode == OP_JUMPI
}

pub fn gas_cost(opcode: u8) -> u64 {
    if (OP_PUSH_MIN..=OP_PUSH_MAX).contains(&opcode) {
        return 3;
    }
    match opcode {
        OP_STOP | OP_RETURN | OP_REVERT => 0,
        OP_POP => 2,
        OP_DUP | OP_SWAP => 3,
        OP_ADD | OP_SUB | OP_NOT | OP_EQ | OP_NE | OP_LT | OP_GT | OP_LE | OP_GE => 3,
        OP_MUL | OP_AND | OP_OR | OP_XOR => 5,
        OP_DIV | OP_MOD => 8,
        OP_JUMP => 8,
        OP_JUMPI => 10,
        OP_SLOAD => 50,
        OP_SSTORE => 200,
        OP_SHA256 => 60,
        OP_VERIFY_SIG | OP_VERIFY_SIG_ECDSA | OP_VERIFY_SIG_QUANTUM => 3_000,
        OP_ADDRESS | OP_CALLER | OP_CALLVALUE | OP_TIMESTAMP | OP_BLOCKHEIGHT | OP_GAS => 2,
        OP_BLOCKHASH | OP_BALANCE => 20,
        OP_LOG => 375,
        OP_CALL => 700,
        _ => 0,
    }
}

pub const MAX_BYTECODE_SIZE: usize = 24 * 1024;
pub const MAX_STACK_DEPTH: usize = 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_opcode_byte_equals_immediate_length() {
        assert_eq!(immediate_len(0x02), 2);
        assert_eq!(immediate_len(0x20), 32);
    }

    #[test]
    fn unknown_opcode_reported_as_unknown() {
        assert!(!is_known_opcode(0xff));
    }
}
