#![doc = r#"
mpfabric library crate.

A cycle-driven simulator of a shared-bus interconnect for a
multiprocessor with private L1 caches and a single shared memory. One
worker thread per Processing Element plus one for the interconnect, all
paced by a barrier-like stepping clock, measure per-transaction latency
under FIFO or QoS-priority arbitration.

Modules:
- clock: monotonic stepping counter + condvar, the only blocking point
- message: the Operation tag and the wire Message moved through queues
- latency: every cost constant and formula of the timing model
- memory: per-PE caches and the shared word store with line IO
- interconnect: three-stage pipeline, arbitration, broadcast registry
- pe: PE state machine, instruction decode, per-cycle worker pass
- system: thread orchestration, driver loop, state dumps
- asm / program: assembler and instruction-binary loader
- workload: pseudo-random workload generation
- qos: QoS configuration parsing
- stats: transaction log and per-PE aggregation
- dump: pluggable snapshot sinks
- error: the error taxonomy

In tests, shared builders are available under `crate::test_utils`.
"#]

pub mod asm;
pub mod clock;
pub mod dump;
pub mod error;
pub mod interconnect;
pub mod latency;
pub mod memory;
pub mod message;
pub mod pe;
pub mod program;
pub mod qos;
pub mod stats;
pub mod system;
pub mod workload;

// Re-export commonly used types at the crate root for convenience.
pub use error::SimError;
pub use interconnect::{ArbitScheme, IcState, Interconnect};
pub use memory::{LocalCache, SharedMemory};
pub use message::{CacheLine, Message, Operation, Status};
pub use system::{MAX_PES, Pacing, RunSummary, System, SystemConfig};

// Shared test utilities (only compiled for tests)
#[cfg(test)]
pub mod test_utils;
