//! Shared test utilities: instruction-word builders and pre-wired
//! systems.
//!
//! These de-duplicate setup across the decode, dispatch and end-to-end
//! suites. Systems built here start from zeroed memory with a generous
//! cycle ceiling so a broken termination predicate fails a test instead
//! of hanging it.

#![allow(dead_code)]

use crate::asm;
use crate::interconnect::ArbitScheme;
use crate::system::{Pacing, RunSummary, System, SystemConfig};

/// Encoded `WRITE_MEM src, addr, num_lines, start_line, qos`.
pub fn write_mem(src: i64, addr: i64, num_lines: i64, start_line: i64, qos: i64) -> u64 {
    asm::encode_write_mem(src, addr, num_lines, start_line, qos).expect("test instruction in range")
}

/// Encoded `READ_MEM src, addr, size_words, qos`.
pub fn read_mem(src: i64, addr: i64, size_words: i64, qos: i64) -> u64 {
    asm::encode_read_mem(src, addr, size_words, qos).expect("test instruction in range")
}

/// Encoded `BROADCAST_INVALIDATE src, cache_line, qos`.
pub fn broadcast_invalidate(src: i64, cache_line: i64, qos: i64) -> u64 {
    asm::encode_broadcast_invalidate(src, cache_line, qos).expect("test instruction in range")
}

/// A system over the given per-PE programs, zeroed state, bounded run.
pub fn system(programs: Vec<Vec<u64>>, scheme: ArbitScheme) -> System {
    system_with_qos(programs, Vec::new(), scheme)
}

/// Same, with explicit per-PE QoS classes.
pub fn system_with_qos(programs: Vec<Vec<u64>>, qos: Vec<u8>, scheme: ArbitScheme) -> System {
    let mut cfg = SystemConfig::new(programs.len(), scheme);
    cfg.programs = programs;
    cfg.qos = qos;
    cfg.max_cycles = Some(500_000);
    System::new(cfg).expect("test system config is valid")
}

/// Run to completion in auto mode.
pub fn run_auto(sys: &mut System) -> RunSummary {
    sys.run(Pacing::Auto).expect("simulation terminates")
}
