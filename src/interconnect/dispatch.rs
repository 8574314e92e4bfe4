/*!
Admission dispatch: what the interconnect does with one popped message.

Every admitted message first pays the arbitration cost, then is handled
by operation kind. Memory faults never unwind out of here: they become
NOT_OK responses so the requesting PE can close its transaction and the
termination barrier keeps its count.
*/

use tracing::{debug, warn};

use crate::interconnect::{AckOutcome, Interconnect};
use crate::latency;
use crate::memory::SharedMemory;
use crate::message::{Message, NO_PE, Operation, Status};

/// Handle one message popped from admission.
pub(crate) fn admit(ic: &Interconnect, shared: &mut SharedMemory, mut msg: Message) {
    let cost = latency::admission(ic.scheme(), msg.num_lines, msg.size_words, msg.qos);
    msg.charge_in_flight(cost);
    debug!(msg = %msg.describe(), admission_cost = cost, "admitted");

    match msg.operation {
        Operation::ReadMem => read_mem(ic, shared, &msg),
        Operation::WriteMem => write_mem(ic, shared, &msg),
        Operation::BroadcastInvalidate => broadcast_invalidate(ic, &msg),
        Operation::InvAck => {
            account_ack(ic, msg.broadcast_id, msg.qos);
        }
        other => {
            // END, UNDEFINED and stray response tags have no admission
            // semantics.
            debug!(operation = %other, "skipping message with no admission handling");
        }
    }
}

fn read_mem(ic: &Interconnect, shared: &SharedMemory, req: &Message) {
    let byte_len = req.size_words * 4;
    let (status, data) = match shared.read_range(req.addr, byte_len) {
        Ok(lines) => (Status::Ok, lines),
        Err(e) => {
            warn!(addr = req.addr, error = %e, "READ_MEM refused");
            (Status::NotOk, Vec::new())
        }
    };

    let mut resp = Message::new(Operation::ReadResp, NO_PE, req.src);
    resp.addr = req.addr;
    resp.qos = req.qos;
    resp.size_words = req.size_words;
    resp.num_lines = data.len() as u32;
    resp.start_line = req.start_line;
    resp.status = status;
    resp.data = data;
    resp.adopt_latency(req);
    resp.charge_in_flight(latency::read_service(req.size_words));
    ic.push_in_flight(resp);
}

fn write_mem(ic: &Interconnect, shared: &mut SharedMemory, req: &Message) {
    let status = if req.data.len() != req.num_lines as usize {
        warn!(
            expected = req.num_lines,
            got = req.data.len(),
            "WRITE_MEM payload does not match its header"
        );
        Status::NotOk
    } else {
        match shared.write_range(req.addr, &req.data) {
            Ok(()) => Status::Ok,
            Err(e) => {
                warn!(addr = req.addr, error = %e, "WRITE_MEM refused");
                Status::NotOk
            }
        }
    };

    let mut resp = Message::new(Operation::WriteResp, NO_PE, req.src);
    resp.addr = req.addr;
    resp.qos = req.qos;
    resp.num_lines = req.num_lines;
    resp.status = status;
    resp.adopt_latency(req);
    resp.charge_in_flight(latency::write_service(req.num_lines));
    ic.push_in_flight(resp);
}

fn broadcast_invalidate(ic: &Interconnect, req: &Message) {
    let fanout = ic.total_pes();
    let bid = ic.broadcasts().register(req.src as usize, fanout as u32);
    debug!(
        broadcast_id = bid,
        origin = req.src,
        line = req.cache_line,
        fanout,
        "broadcast registered"
    );

    // Every PE, the origin included, gets an INV_LINE and must ack it;
    // that is what makes the pending count equal the fanout width.
    for pid in 0..fanout {
        let mut inv = Message::new(Operation::InvLine, req.src, pid as i32);
        inv.qos = req.qos;
        inv.cache_line = req.cache_line;
        inv.broadcast_id = bid;
        inv.adopt_latency(req);
        inv.charge_in_flight(latency::INV_FANOUT);
        ic.push_in_flight(inv);
    }
}

/// Account one ack against a broadcast; emits the INV_COMPLETE when the
/// last one lands. Shared by normal admission and the dead-letter sweep.
pub(crate) fn account_ack(ic: &Interconnect, broadcast_id: u32, qos: u8) {
    match ic.broadcasts().account_ack(broadcast_id) {
        None => {
            warn!(broadcast_id, "INV_ACK names an unknown broadcast");
            ic.note_violation();
        }
        Some(AckOutcome::Pending(left)) => {
            debug!(broadcast_id, pending = left, "ack accounted");
        }
        Some(AckOutcome::Complete { origin }) => {
            debug!(broadcast_id, origin, "all acks in, completing");
            let mut done = Message::new(Operation::InvComplete, NO_PE, origin as i32);
            done.qos = qos;
            done.broadcast_id = broadcast_id;
            done.charge_in_flight(latency::inv_complete_service(ic.total_pes()));
            done.charge_in_flight(latency::INV_COMPLETE_EMIT);
            ic.push_in_flight(done);
        }
    }
}

/// Drop egress messages whose destination PE has already finished.
///
/// A PE with an empty or malformed stream can reach FINISHED before a
/// peer broadcasts; its worker is gone, so nothing would ever consume the
/// INV_LINE and the simulation would never drain. Each drop is a protocol
/// violation; a dropped INV_LINE has its ack accounted on the dead PE's
/// behalf so the broadcast still completes for the origin.
pub(crate) fn sweep_dead_letters(ic: &Interconnect, is_finished: impl Fn(usize) -> bool) {
    let dead = ic
        .out_queue()
        .drain_matching(|m| m.dest >= 0 && is_finished(m.dest as usize));
    for msg in dead {
        warn!(msg = %msg.describe(), "dropping message for finished PE");
        ic.note_violation();
        if msg.operation == Operation::InvLine {
            account_ack(ic, msg.broadcast_id, msg.qos);
        }
    }
}
