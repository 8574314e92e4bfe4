/*!
Latency model: every cost constant and formula in one place.

All externally observable time is integer cycles. The admission formula
is the only fractional computation (the PRIORITY divisor); it is carried
in `f64` and rounded half-up exactly once before being applied.

PE-side costs charge the end-to-end ledger only. Interconnect-side costs
charge both the ledger and the in-flight counter that the middle queue
drains.
*/

use crate::interconnect::ArbitScheme;

// PE-side costs (ledger only).

/// Fetching and decoding one instruction.
pub const FETCH_DECODE: u32 = 3;
/// Reading one local cache line while building a WRITE_MEM payload.
pub const CACHE_READ_PER_LINE: u32 = 4;
/// Handing a request to the interconnect.
pub const ISSUE: u32 = 5;
/// Popping a response from the egress queue.
pub const RESPONSE_HANDOFF: u32 = 10;
/// Flipping a line's invalid bit on INV_LINE.
pub const LINE_INVALIDATE: u32 = 6;
/// Building the INV_ACK reply.
pub const ACK_BUILD: u32 = 3;
/// Submitting the INV_ACK back to admission.
pub const ACK_ISSUE: u32 = 4;
/// Writing one payload word into the local cache on READ_RESP.
pub const CACHE_WRITE_PER_WORD: u32 = 4;
/// Accepting WRITE_RESP or INV_COMPLETE.
pub const RESPONSE_ACCEPT: u32 = 5;

// Interconnect-side costs (ledger + in-flight).

/// Weight of the admission-queue formula.
pub const ADMISSION_WEIGHT: f64 = 2.0;
/// Base cost of a shared-memory read, before the per-word term.
pub const MEM_READ_BASE: u32 = 60;
/// Base term of the shared-memory write formula.
pub const MEM_WRITE_BASE: f64 = 80.0;
/// Per-line scale of the shared-memory write formula.
pub const MEM_WRITE_SCALE: f64 = 0.04;
/// Fanout cost added to each INV_LINE of a broadcast.
pub const INV_FANOUT: u32 = 6;
/// INV_COMPLETE starts with this many cycles per connected PE.
pub const INV_COMPLETE_PER_PE: u32 = 5;
/// Emission cost added on top of the INV_COMPLETE base.
pub const INV_COMPLETE_EMIT: u32 = 5;

/// Admission-queue latency for one message.
///
/// FIFO charges `w * (num_lines + size_words + 1)`. PRIORITY charges the
/// same quantity scaled down by `(qos + 1)` so high-QoS traffic matures
/// faster; QoS 0 pays the full FIFO price.
pub fn admission(scheme: ArbitScheme, num_lines: u32, size_words: u32, qos: u8) -> u32 {
    let base = ADMISSION_WEIGHT * f64::from(num_lines + size_words + 1);
    let scaled = match scheme {
        ArbitScheme::Fifo => base,
        ArbitScheme::Priority => base / f64::from(u32::from(qos) + 1),
    };
    scaled.round() as u32
}

/// Shared-memory service cost of a READ_MEM, proportional to the words
/// fetched.
pub fn read_service(size_words: u32) -> u32 {
    MEM_READ_BASE + size_words
}

/// Shared-memory service cost of a WRITE_MEM, proportional to the lines
/// stored.
pub fn write_service(num_lines: u32) -> u32 {
    ((MEM_WRITE_BASE + f64::from(num_lines)) * f64::from(num_lines) * MEM_WRITE_SCALE).round()
        as u32
}

/// Base in-flight cost of the INV_COMPLETE closing a broadcast over
/// `total_pes` participants.
pub fn inv_complete_service(total_pes: usize) -> u32 {
    INV_COMPLETE_PER_PE * total_pes as u32
}
