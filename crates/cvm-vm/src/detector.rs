//! C5 — bytecode format detection: is a byte sequence our native opcode
//! stream, EVM-compatible bytecode, a hybrid of both, or neither.

use crate::opcodes as native;
use cvm_core::config::DetectorConfig;
use cvm_core::hash::sha256;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;

/// 4-byte magic marking the boundary between the native and EVM sections
/// of a hybrid payload.
pub const HYBRID_SEPARATOR: [u8; 4] = [0xFE, 0xED, 0xFA, 0xCE];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BytecodeFormat {
    Unknown,
    Native,
    Evm,
    Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResult {
    pub format: BytecodeFormat,
    pub confidence: f64,
    pub is_valid: bool,
    pub estimated_size: usize,
    pub reason: String,
    /// For `Hybrid`: byte offset where the EVM section begins (the
    /// native section is `[0, offset)`, the separator and EVM section
    /// follow).
    pub hybrid_split: Option<usize>,
}

// --- EVM-like opcode recognition (a deliberately partial table: this
// crate never executes EVM bytecode itself, it only needs to recognise
// its shape to route to the host-provided interpreter) ---

mod evm_like {
    pub const PUSH1: u8 = 0x60;
    pub const PUSH32: u8 = 0x7f;
    pub const DUP1: u8 = 0x80;
    pub const DUP16: u8 = 0x8f;
    pub const SWAP1: u8 = 0x90;
    pub const SWAP16: u8 = 0x9f;
    pub const JUMPDEST: u8 = 0x5b;
    pub const JUMP: u8 = 0x56;
    pub const JUMPI: u8 = 0x57;

    pub fn is_known(op: u8) -> bool {
        matches!(
            op,
            0x00..=0x0b
                | 0x10..=0x1d
                | 0x20
                | 0x30..=0x48
                | 0x50..=0x5b
                | PUSH1..=PUSH32
                | DUP1..=DUP16
                | SWAP1..=SWAP16
                | 0xa0..=0xa4
                | 0xf0..=0xf5
                | 0xfa
                | 0xfd
                | 0xfe
                | 0xff
        )
    }

    pub fn immediate_len(op: u8) -> usize {
        if (PUSH1..=PUSH32).contains(&op) {
            (op - PUSH1 + 1) as usize
        } else {
            0
        }
    }
}

struct ScanStats {
    total_instructions: usize,
    known_instructions: usize,
    malformed_push: bool,
    jumpdest_count: usize,
    jump_count: usize,
    instruction_starts: Vec<usize>,
}

fn scan_native(bytecode: &[u8]) -> ScanStats {
    let mut stats = ScanStats {
        total_instructions: 0,
        known_instructions: 0,
        malformed_push: false,
        jumpdest_count: 0,
        jump_count: 0,
        instruction_starts: Vec::new(),
    };
    let mut pc = 0usize;
    while pc < bytecode.len() {
        stats.instruction_starts.push(pc);
        stats.total_instructions += 1;
        let op = bytecode[pc];
        if native::is_known_opcode(op) {
            stats.known_instructions += 1;
        }
        if native::is_jump(op) {
            stats.jump_count += 1;
        }
        let imm = native::immediate_len(op);
        if pc + 1 + imm > bytecode.len() {
            stats.malformed_push = true;
            break;
        }
        pc += 1 + imm;
    }
    stats
}

fn scan_evm(bytecode: &[u8]) -> ScanStats {
    let mut stats = ScanStats {
        total_instructions: 0,
        known_instructions: 0,
        malformed_push: false,
        jumpdest_count: 0,
        jump_count: 0,
        instruction_starts: Vec::new(),
    };
    let mut pc = 0usize;
    while pc < bytecode.len() {
        stats.instruction_starts.push(pc);
        stats.total_instructions += 1;
        let op = bytecode[pc];
        if evm_like::is_known(op) {
            stats.known_instructions += 1;
        }
        if op == evm_like::JUMPDEST {
            stats.jumpdest_count += 1;
        }
        if op == evm_like::JUMP || op == evm_like::JUMPI {
            stats.jump_count += 1;
        }
        let imm = evm_like::immediate_len(op);
        if pc + 1 + imm > bytecode.len() {
            stats.malformed_push = true;
            break;
        }
        pc += 1 + imm;
    }
    stats
}

fn shannon_entropy(bytecode: &[u8]) -> f64 {
    if bytecode.is_empty() {
        return 0.0;
    }
    let mut counts = [0u32; 256];
    for &b in bytecode {
        counts[b as usize] += 1;
    }
    let len = bytecode.len() as f64;
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / len;
            -p * p.log2()
        })
        .sum()
}

fn native_confidence(bytecode: &[u8]) -> f64 {
    if bytecode.is_empty() {
        return 0.0;
    }
    let stats = scan_native(bytecode);
    let known_ratio = if stats.total_instructions == 0 {
        0.0
    } else {
        stats.known_instructions as f64 / stats.total_instructions as f64
    };
    let malformed_penalty = if stats.malformed_push { 0.3 } else { 0.0 };
    let entropy = shannon_entropy(bytecode);
    // well-formed opcode streams sit well below random-byte entropy (8.0)
    let entropy_score = (1.0 - (entropy / 8.0)).clamp(0.0, 1.0);
    (0.7 * known_ratio + 0.3 * entropy_score - malformed_penalty).clamp(0.0, 1.0)
}

fn evm_confidence(bytecode: &[u8]) -> f64 {
    if bytecode.is_empty() {
        return 0.0;
    }
    let stats = scan_evm(bytecode);
    let known_ratio = if stats.total_instructions == 0 {
        0.0
    } else {
        stats.known_instructions as f64 / stats.total_instructions as f64
    };
    let malformed_penalty = if stats.malformed_push { 0.3 } else { 0.0 };
    let jump_consistency = if stats.jump_count == 0 {
        1.0
    } else {
        (stats.jumpdest_count as f64 / stats.jump_count as f64).min(1.0)
    };
    (0.6 * known_ratio + 0.3 * jump_consistency + 0.1 - malformed_penalty).clamp(0.0, 1.0)
}

fn find_separator(bytecode: &[u8]) -> Option<usize> {
    bytecode
        .windows(HYBRID_SEPARATOR.len())
        .position(|w| w == HYBRID_SEPARATOR)
}

/// Pure classification function: identical input always produces
/// identical output, independent of call order. Caching (see
/// [`DetectorCache`]) is purely an optimisation on top.
pub fn detect(bytecode: &[u8], config: &DetectorConfig) -> DetectionResult {
    if bytecode.is_empty() {
        return DetectionResult {
            format: BytecodeFormat::Unknown,
            confidence: 0.0,
            is_valid: false,
            estimated_size: 0,
            reason: "empty bytecode".into(),
            hybrid_split: None,
        };
    }

    let native_c = native_confidence(bytecode);
    let evm_c = evm_confidence(bytecode);
    let separator = find_separator(bytecode);

    if (native_c - evm_c).abs() < config.hybrid_confidence_gap
        && native_c >= config.hybrid_min_confidence
        && evm_c >= config.hybrid_min_confidence
        && separator.is_some()
    {
        let split = separator.unwrap();
        return DetectionResult {
            format: BytecodeFormat::Hybrid,
            confidence: (native_c + evm_c) / 2.0,
            is_valid: validate(bytecode, BytecodeFormat::Hybrid).is_ok(),
            estimated_size: bytecode.len(),
            reason: "ambiguous confidence with hybrid separator marker present".into(),
            hybrid_split: Some(split),
        };
    }

    let (format, confidence, reason) = if native_c >= evm_c {
        (BytecodeFormat::Native, native_c, "native signal dominates")
    } else {
        (BytecodeFormat::Evm, evm_c, "evm signal dominates")
    };

    if confidence < config.confidence_threshold {
        return DetectionResult {
            format: BytecodeFormat::Unknown,
            confidence,
            is_valid: false,
            estimated_size: bytecode.len(),
            reason: "confidence below threshold".into(),
            hybrid_split: None,
        };
    }

    DetectionResult {
        is_valid: validate(bytecode, format).is_ok(),
        format,
        confidence,
        estimated_size: bytecode.len(),
        reason: reason.into(),
        hybrid_split: None,
    }
}

/// Interprets a big-endian immediate as a byte offset, rejecting values
/// that don't fit in a `usize` (any such value is larger than
/// [`native::MAX_BYTECODE_SIZE`] anyway and so could never be a valid
/// jump target).
fn push_immediate_as_offset(imm: &[u8]) -> Option<usize> {
    let tail_start = imm.len().saturating_sub(8);
    if imm[..tail_start].iter().any(|&b| b != 0) {
        return None;
    }
    let mut buf = [0u8; 8];
    let tail = &imm[tail_start..];
    buf[8 - tail.len()..].copy_from_slice(tail);
    usize::try_from(u64::from_be_bytes(buf)).ok()
}

/// Second-pass structural validation: every opcode known, every push
/// immediate well-formed and in-stream, and (where statically
/// determinable) jump targets land inside the code and on an instruction
/// boundary. A jump target is statically determinable only when the
/// jump is immediately preceded by a `PUSH`; a target computed at
/// runtime (e.g. via arithmetic) is left to the interpreter to check.
pub fn validate(bytecode: &[u8], format: BytecodeFormat) -> Result<(), String> {
    if bytecode.len() > native::MAX_BYTECODE_SIZE {
        return Err(format!("bytecode exceeds {} byte ceiling", native::MAX_BYTECODE_SIZE));
    }
    match format {
        BytecodeFormat::Native => validate_native(bytecode),
        BytecodeFormat::Evm => validate_evm(bytecode),
        BytecodeFormat::Hybrid => {
            let split = find_separator(bytecode).ok_or("hybrid bytecode missing separator")?;
            validate_native(&bytecode[..split])?;
            let evm_part = &bytecode[split + HYBRID_SEPARATOR.len()..];
            validate_evm(evm_part)
        }
        BytecodeFormat::Unknown => Err("cannot validate unknown format".into()),
    }
}

fn validate_native(bytecode: &[u8]) -> Result<(), String> {
    let stats = scan_native(bytecode);
    if stats.malformed_push {
        return Err("push immediate runs past end of code".into());
    }
    if stats.known_instructions != stats.total_instructions {
        return Err("unknown opcode present".into());
    }
    for (i, &start) in stats.instruction_starts.iter().enumerate() {
        let op = bytecode[start];
        if !native::is_jump(op) || i == 0 {
            continue;
        }
        let prev_start = stats.instruction_starts[i - 1];
        let prev_op = bytecode[prev_start];
        if !(native::OP_PUSH_MIN..=native::OP_PUSH_MAX).contains(&prev_op) {
            continue;
        }
        let imm = &bytecode[prev_start + 1..start];
        let target = push_immediate_as_offset(imm)
            .filter(|t| *t < bytecode.len() && stats.instruction_starts.binary_search(t).is_ok());
        if target.is_none() {
            return Err(format!("jump at offset {start} has a constant target outside the code or off an instruction boundary"));
        }
    }
    Ok(())
}

fn validate_evm(bytecode: &[u8]) -> Result<(), String> {
    let stats = scan_evm(bytecode);
    if stats.malformed_push {
        return Err("push immediate runs past end of code".into());
    }
    if stats.known_instructions != stats.total_instructions {
        return Err("unknown opcode present".into());
    }
    Ok(())
}

/// LRU cache keyed by content hash, memoising [`detect`] results.
pub struct DetectorCache {
    cache: Mutex<LruCache<[u8; 32], DetectionResult>>,
}

impl DetectorCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self { cache: Mutex::new(LruCache::new(cap)) }
    }

    pub fn detect_cached(&self, bytecode: &[u8], config: &DetectorConfig) -> DetectionResult {
        let key = sha256(bytecode);
        if let Some(hit) = self.cache.lock().get(&key) {
            return hit.clone();
        }
        let result = detect(bytecode, config);
        self.cache.lock().put(key, result.clone());
        result
    }
}

impl Default for DetectorCache {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes::*;

    #[test]
    fn detects_native_push_add_sstore_sequence() {
        // S1: PUSH1 0x02, PUSH1 0x03, ADD, PUSH1 0x00, SSTORE, STOP
        let code = vec![0x01, 0x02, 0x01, 0x03, OP_ADD, 0x01, 0x00, OP_SSTORE, OP_STOP];
        let result = detect(&code, &DetectorConfig::default());
        assert_eq!(result.format, BytecodeFormat::Native);
        assert!(result.is_valid);
    }

    #[test]
    fn empty_bytecode_is_unknown_and_invalid() {
        let result = detect(&[], &DetectorConfig::default());
        assert_eq!(result.format, BytecodeFormat::Unknown);
        assert!(!result.is_valid);
    }

    #[test]
    fn detector_is_pure_and_stable_across_calls() {
        let code = vec![0x01, 0x02, OP_ADD, OP_STOP];
        let cfg = DetectorConfig::default();
        let a = detect(&code, &cfg);
        let b = detect(&code, &cfg);
        assert_eq!(a.format, b.format);
        assert_eq!(a.confidence, b.confidence);
    }

    #[test]
    fn cache_returns_same_result_as_uncached() {
        let code = vec![0x01, 0x02, OP_ADD, OP_STOP];
        let cfg = DetectorConfig::default();
        let cache = DetectorCache::new(10);
        let uncached = detect(&code, &cfg);
        let cached = cache.detect_cached(&code, &cfg);
        assert_eq!(uncached.format, cached.format);
    }

    #[test]
    fn hybrid_detected_when_separator_present_and_confidences_close() {
        let mut code = vec![0x01, 0x02, OP_ADD, OP_STOP];
        code.extend_from_slice(&HYBRID_SEPARATOR);
        code.extend_from_slice(&[0x60, 0x01, 0x60, 0x02, 0x01, 0x00]); // PUSH1 1, PUSH1 2, ADD, STOP
        let result = detect(&code, &DetectorConfig::default());
        // Either a clean classification or hybrid is acceptable depending
        // on the confidence gap; the separator alone must not force
        // hybrid without both signals being strong.
        assert!(matches!(
            result.format,
            BytecodeFormat::Hybrid | BytecodeFormat::Native | BytecodeFormat::Evm
        ));
    }

    #[test]
    fn jump_with_constant_target_on_instruction_boundary_is_valid() {
        // PUSH1 0x00, JUMP, STOP — jump targets offset 0, the PUSH itself.
        let code = vec![0x01, 0x00, OP_JUMP, OP_STOP];
        assert!(validate(&code, BytecodeFormat::Native).is_ok());
    }

    #[test]
    fn jump_with_constant_target_off_boundary_is_rejected() {
        // PUSH1 0x01, JUMP — offset 1 lands mid-instruction, not on a boundary.
        let code = vec![0x01, 0x01, OP_JUMP, OP_STOP];
        assert!(validate(&code, BytecodeFormat::Native).is_err());
    }

    #[test]
    fn jump_with_dynamic_target_is_left_to_the_interpreter() {
        // ADD, JUMP — the jump target comes from arithmetic, not a constant push.
        let code = vec![OP_ADD, OP_JUMP, OP_STOP];
        assert!(validate(&code, BytecodeFormat::Native).is_ok());
    }
}
