/*!
Message: the unit of transport between PEs and the Interconnect.

A single movable record carries every operation kind so the queues stay
simple; the `Operation` tag decides which fields are meaningful. Payload
data travels as whole 16-byte cache lines.

Latency bookkeeping lives here as two counters:
- `remaining_latency` drains one cycle at a time inside the in-flight
  queue and decides when a message becomes visible to its destination.
- `full_latency` is the end-to-end ledger reported in the transaction
  log. It only ever grows.
*/

/// Bytes per cache line / payload unit.
pub const LINE_SIZE: usize = 16;

/// One 16-byte payload line.
pub type CacheLine = [u8; LINE_SIZE];

/// Destination/source id marking "the interconnect" or "broadcast".
pub const NO_PE: i32 = -1;

/// Operation tags moved across the fabric.
///
/// Request tags (`ReadMem`, `WriteMem`, `BroadcastInvalidate`) enter only
/// through the admission queue; response tags leave only through the
/// egress queue. `InvAck` is the one response-side tag that re-enters
/// admission.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    ReadMem,
    WriteMem,
    BroadcastInvalidate,
    InvLine,
    InvAck,
    InvComplete,
    ReadResp,
    WriteResp,
    End,
    Undefined,
}

impl Operation {
    /// Wire/log name, matching the assembler mnemonics.
    pub fn name(self) -> &'static str {
        match self {
            Operation::ReadMem => "READ_MEM",
            Operation::WriteMem => "WRITE_MEM",
            Operation::BroadcastInvalidate => "BROADCAST_INVALIDATE",
            Operation::InvLine => "INV_LINE",
            Operation::InvAck => "INV_ACK",
            Operation::InvComplete => "INV_COMPLETE",
            Operation::ReadResp => "READ_RESP",
            Operation::WriteResp => "WRITE_RESP",
            Operation::End => "END",
            Operation::Undefined => "UNDEFINED",
        }
    }

    /// Parse a log/wire name back into a tag.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "READ_MEM" => Operation::ReadMem,
            "WRITE_MEM" => Operation::WriteMem,
            "BROADCAST_INVALIDATE" => Operation::BroadcastInvalidate,
            "INV_LINE" => Operation::InvLine,
            "INV_ACK" => Operation::InvAck,
            "INV_COMPLETE" => Operation::InvComplete,
            "READ_RESP" => Operation::ReadResp,
            "WRITE_RESP" => Operation::WriteResp,
            "END" => Operation::End,
            "UNDEFINED" => Operation::Undefined,
            _ => return None,
        })
    }

    /// True for tags a PE may submit as a new transaction.
    pub fn is_request(self) -> bool {
        matches!(
            self,
            Operation::ReadMem | Operation::WriteMem | Operation::BroadcastInvalidate
        )
    }

    /// True for tags delivered to a PE through the egress queue.
    pub fn is_response(self) -> bool {
        matches!(
            self,
            Operation::ReadResp
                | Operation::WriteResp
                | Operation::InvLine
                | Operation::InvComplete
        )
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Completion status carried by responses.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Status {
    #[default]
    Ok,
    NotOk,
}

/// The wire record moved through the three interconnect queues.
#[derive(Clone, Debug)]
pub struct Message {
    pub operation: Operation,
    /// Originating PE, or `NO_PE` for interconnect-built messages.
    pub src: i32,
    /// Destination PE, or `NO_PE` for requests addressed to the fabric.
    pub dest: i32,
    /// Byte address into shared memory (word aligned).
    pub addr: u64,
    /// 4-bit QoS class, 0 lowest.
    pub qos: u8,
    /// Transfer size in 32-bit words.
    pub size_words: u32,
    /// Cache lines touched by the operation.
    pub num_lines: u32,
    /// First cache line for payload placement.
    pub start_line: u32,
    /// Single line index named by an invalidation.
    pub cache_line: u32,
    pub status: Status,
    /// Payload lines; empty, or exactly `num_lines` long.
    pub data: Vec<CacheLine>,
    /// Correlates an invalidation fanout with its acks; 0 = none.
    pub broadcast_id: u32,

    remaining_latency: u32,
    full_latency: u32,
}

impl Message {
    /// A blank message of the given kind between `src` and `dest`.
    /// Field defaults match "not meaningful for this operation".
    pub fn new(operation: Operation, src: i32, dest: i32) -> Self {
        Message {
            operation,
            src,
            dest,
            addr: 0,
            qos: 0,
            size_words: 0,
            num_lines: 0,
            start_line: 0,
            cache_line: 0,
            status: Status::Ok,
            data: Vec::new(),
            broadcast_id: 0,
            remaining_latency: 0,
            full_latency: 0,
        }
    }

    /// Cycles still owed in the in-flight queue.
    pub fn remaining_latency(&self) -> u32 {
        self.remaining_latency
    }

    /// Accumulated end-to-end cycles.
    pub fn full_latency(&self) -> u32 {
        self.full_latency
    }

    /// Charge cycles to the ledger only (PE-side processing costs).
    pub fn charge(&mut self, cycles: u32) {
        self.full_latency += cycles;
    }

    /// Charge cycles that must also be served in the in-flight queue
    /// before this message matures (interconnect-side costs).
    pub fn charge_in_flight(&mut self, cycles: u32) {
        self.remaining_latency += cycles;
        self.full_latency += cycles;
    }

    /// Carry a request's counters over onto the response it produced.
    pub fn adopt_latency(&mut self, of: &Message) {
        self.remaining_latency = of.remaining_latency;
        self.full_latency = of.full_latency;
    }

    /// Drain one cycle of in-flight latency; true once fully matured.
    pub fn tick_in_flight(&mut self) -> bool {
        self.remaining_latency = self.remaining_latency.saturating_sub(1);
        self.remaining_latency == 0
    }

    /// Compact one-line rendering for traces.
    pub fn describe(&self) -> String {
        format!(
            "{} src={} dest={} addr={:#x} qos={:#x} size={}w lines={} bid={} lat={}/{}",
            self.operation,
            self.src,
            self.dest,
            self.addr,
            self.qos,
            self.size_words,
            self.num_lines,
            self.broadcast_id,
            self.remaining_latency,
            self.full_latency
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_response_split() {
        assert!(Operation::ReadMem.is_request());
        assert!(Operation::WriteMem.is_request());
        assert!(Operation::BroadcastInvalidate.is_request());
        assert!(!Operation::InvAck.is_request());

        assert!(Operation::ReadResp.is_response());
        assert!(Operation::InvLine.is_response());
        assert!(!Operation::InvAck.is_response());
        assert!(!Operation::ReadMem.is_response());
    }

    #[test]
    fn names_round_trip() {
        for op in [
            Operation::ReadMem,
            Operation::WriteMem,
            Operation::BroadcastInvalidate,
            Operation::InvLine,
            Operation::InvAck,
            Operation::InvComplete,
            Operation::ReadResp,
            Operation::WriteResp,
            Operation::End,
            Operation::Undefined,
        ] {
            assert_eq!(Operation::from_name(op.name()), Some(op));
        }
        assert_eq!(Operation::from_name("NOPE"), None);
    }

    #[test]
    fn latency_counters() {
        let mut m = Message::new(Operation::ReadMem, 0, NO_PE);
        m.charge(3);
        assert_eq!(m.full_latency(), 3);
        assert_eq!(m.remaining_latency(), 0);

        m.charge_in_flight(2);
        assert_eq!(m.full_latency(), 5);
        assert_eq!(m.remaining_latency(), 2);

        assert!(!m.tick_in_flight());
        assert!(m.tick_in_flight());
        // Saturates at zero, never negative.
        assert!(m.tick_in_flight());
        assert_eq!(m.remaining_latency(), 0);
        assert_eq!(m.full_latency(), 5);
    }

    #[test]
    fn adopt_carries_both_counters() {
        let mut req = Message::new(Operation::WriteMem, 1, NO_PE);
        req.charge(8);
        req.charge_in_flight(4);

        let mut resp = Message::new(Operation::WriteResp, NO_PE, 1);
        resp.adopt_latency(&req);
        assert_eq!(resp.full_latency(), 12);
        assert_eq!(resp.remaining_latency(), 4);
    }
}
