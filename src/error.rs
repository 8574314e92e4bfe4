/*!
Error taxonomy for the simulator.

Four layers, mirroring how faults propagate:
- `MemoryError`: range/alignment violations from the line-IO stores. The
  interconnect converts these into NOT_OK responses; callers outside the
  simulation loop treat them as fatal.
- `DecodeError`: a malformed 64-bit instruction word. Fatal to the PE that
  fetched it, never to the simulation.
- `AsmError` / `ProgramError`: rejection of operator-supplied input files.
- `SimError`: top-level composition used by `System` and the binary.
*/

use std::io;

use thiserror::Error;

/// Range and alignment faults from `LocalCache` and `SharedMemory`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("address {addr:#x} is not word aligned")]
    Misaligned { addr: u64 },

    #[error("byte range {addr:#x}+{len} exceeds shared memory")]
    OutOfRange { addr: u64, len: u32 },

    #[error("cache line range {start}+{count} exceeds cache capacity")]
    LineOutOfRange { start: u32, count: u32 },

    #[error("payload holds {got} lines, header names {expected}")]
    PayloadMismatch { expected: u32, got: u32 },
}

/// A fetched instruction word that cannot become a request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unrecognized opcode bits {bits:#04b} in word {word:#018x}")]
    UnknownOpcode { bits: u8, word: u64 },

    #[error("instruction field {field} holds out-of-range value {value}")]
    FieldRange { field: &'static str, value: u64 },

    #[error("instruction address {addr:#x} is not word aligned")]
    MisalignedAddr { addr: u64 },
}

/// Assembler rejection. Line numbers are 1-based.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AsmError {
    #[error("line {line}: unknown mnemonic '{mnemonic}'")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("line {line}: expected {expected} operands, found {found}")]
    OperandCount {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: '{token}' is not a valid integer")]
    BadInteger { line: usize, token: String },

    #[error("line {line}: {field} value {value} is out of range")]
    FieldRange {
        line: usize,
        field: &'static str,
        value: i64,
    },

    #[error("line {line}: address {value} is not a multiple of 4")]
    MisalignedAddr { line: usize, value: i64 },
}

/// Instruction-binary loader rejection. Line numbers are 1-based.
#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("line {line}: expected 64 binary digits, found {len} characters")]
    BadLength { line: usize, len: usize },

    #[error("line {line}: invalid character '{ch}' in binary instruction")]
    BadChar { line: usize, ch: char },

    #[error("line {line}: '{text}' is not a valid hexadecimal word")]
    BadHex { line: usize, text: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Top-level simulation errors surfaced to the operator.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("PE count {0} outside the supported range 1..=32")]
    PeCount(usize),

    #[error("{programs} program(s) supplied for {pes} PE(s)")]
    ProgramCount { programs: usize, pes: usize },

    #[error("simulation exceeded the cycle limit of {0}")]
    CycleLimit(u64),

    #[error(transparent)]
    Program(#[from] ProgramError),

    #[error(transparent)]
    Asm(#[from] AsmError),

    #[error(transparent)]
    Io(#[from] io::Error),
}
