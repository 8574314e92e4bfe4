/*!
PE worker: the guarded per-cycle pass of one Processing Element.

Order of operations within a pass, per tick:
1. Consume at most one response addressed to this PE (responses are also
   drained when the PE is not strictly WAITING, so a PE whose stream is
   exhausted still acks invalidations instead of wedging a broadcast).
2. Otherwise, if idle and the stream has instructions left, fetch,
   decode, attach the cache payload for writes, and issue.
3. Evaluate the termination predicate and exit when it holds.

A malformed instruction is fatal to this PE only: it logs and goes
straight to FINISHED, leaving its peers and the fabric running.
*/

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, error, info, warn};

use crate::clock::StepClock;
use crate::interconnect::Interconnect;
use crate::latency;
use crate::memory::LocalCache;
use crate::message::{Message, NO_PE, Operation, Status};
use crate::pe::decode::decode;
use crate::pe::{ExecBoard, ExecState, Pe, RespState};
use crate::stats::{TransactionLog, TransactionRecord};

/// Run one PE to completion. Blocks only inside the clock.
pub(crate) fn run(
    mut pe: Pe,
    cache: &Mutex<LocalCache>,
    ic: &Interconnect,
    clock: &StepClock,
    board: &ExecBoard,
    log: &TransactionLog,
    halt: &AtomicBool,
) {
    let id = pe.id();
    info!(
        pe = id,
        qos = pe.qos(),
        instructions = pe.program_len(),
        "PE worker starting"
    );

    let mut last_step = 0;
    loop {
        last_step = clock.await_next(last_step);
        if halt.load(Ordering::Relaxed) {
            break;
        }

        // 1) At most one response per tick.
        let handled = if let Some(resp) = ic.pop_response(id) {
            handle_response(&mut pe, cache, ic, log, resp);
            true
        } else {
            if pe.resp_state() == RespState::Waiting {
                debug!(pe = id, pc = pe.pc(), "waiting for response");
            }
            false
        };

        // 2) Issue the next instruction if nothing else happened.
        if !handled && pe.exec_state() == ExecState::Idle {
            if let Some(word) = pe.fetch() {
                match decode(word) {
                    Ok(msg) => issue(&mut pe, cache, ic, msg),
                    Err(e) => {
                        error!(pe = id, pc = pe.pc(), error = %e, "malformed instruction, abandoning stream");
                        pe.set_exec_state(ExecState::Finished);
                        board.set(id, ExecState::Finished);
                        break;
                    }
                }
            }
        }

        // 3) Done?
        if pe.finish_predicate(ic.pending_for(id)) {
            pe.set_exec_state(ExecState::Finished);
            board.set(id, ExecState::Finished);
            info!(pe = id, "PE finished");
            break;
        }
    }

    info!(pe = id, "PE worker exiting");
}

fn handle_response(
    pe: &mut Pe,
    cache: &Mutex<LocalCache>,
    ic: &Interconnect,
    log: &TransactionLog,
    mut resp: Message,
) {
    pe.set_resp_state(RespState::Processing);
    resp.charge(latency::RESPONSE_HANDOFF);
    debug!(pe = pe.id(), msg = %resp.describe(), "response popped");

    match resp.operation {
        Operation::InvLine => {
            if let Err(e) = lock(cache).invalidate(resp.cache_line) {
                warn!(pe = pe.id(), error = %e, "invalidation names a bad line");
            }

            // Reply with the ack; it carries this PE's own QoS class.
            let mut ack = Message::new(Operation::InvAck, pe.id() as i32, NO_PE);
            ack.qos = pe.qos();
            ack.broadcast_id = resp.broadcast_id;

            resp.charge(latency::LINE_INVALIDATE + latency::ACK_BUILD + latency::ACK_ISSUE);
            log.record(TransactionRecord::from_response(&resp));
            ic.submit(ack);

            // The invalidation never closes this PE's own transaction.
            settle(pe, ic);
        }
        Operation::ReadResp => {
            if resp.status == Status::Ok {
                if let Err(e) = lock(cache).write_lines(resp.start_line, &resp.data) {
                    warn!(pe = pe.id(), error = %e, "cache refill failed");
                }
            } else {
                warn!(pe = pe.id(), addr = resp.addr, "READ_MEM came back NOT_OK");
            }
            resp.charge(latency::CACHE_WRITE_PER_WORD * resp.size_words);
            log.record(TransactionRecord::from_response(&resp));
            pe.clear_current();
            settle(pe, ic);
        }
        Operation::WriteResp | Operation::InvComplete => {
            if resp.operation == Operation::WriteResp && resp.status == Status::NotOk {
                warn!(pe = pe.id(), addr = resp.addr, "WRITE_MEM came back NOT_OK");
            }
            resp.charge(latency::RESPONSE_ACCEPT);
            log.record(TransactionRecord::from_response(&resp));
            pe.clear_current();
            settle(pe, ic);
        }
        other => {
            warn!(pe = pe.id(), operation = %other, "unexpected tag in egress, dropping");
            ic.note_violation();
        }
    }
}

/// Decide where the PE lands after handling a response: still blocked if
/// its own transaction is open or more traffic is bound for it, idle
/// otherwise.
fn settle(pe: &mut Pe, ic: &Interconnect) {
    if pe.current().is_some() || ic.pending_for(pe.id()) {
        pe.set_exec_state(ExecState::Stalled);
        pe.set_resp_state(RespState::Waiting);
    } else {
        pe.set_resp_state(RespState::Completed);
        pe.set_exec_state(ExecState::Idle);
    }
}

fn issue(pe: &mut Pe, cache: &Mutex<LocalCache>, ic: &Interconnect, mut msg: Message) {
    pe.set_exec_state(ExecState::Running);
    if msg.src != pe.id() as i32 {
        debug!(
            pe = pe.id(),
            src = msg.src,
            "instruction src field disagrees with the issuing PE"
        );
    }

    msg.charge(latency::FETCH_DECODE);

    if msg.operation == Operation::WriteMem {
        let cache = lock(cache);
        if cache.any_invalid(msg.start_line, msg.num_lines) {
            warn!(
                pe = pe.id(),
                start = msg.start_line,
                count = msg.num_lines,
                "writing from lines still marked invalid"
            );
        }
        match cache.read_lines(msg.start_line, msg.num_lines) {
            Ok(lines) => {
                msg.data = lines;
                msg.charge(latency::CACHE_READ_PER_LINE * msg.num_lines);
            }
            Err(e) => {
                // Still issued; the fabric answers NOT_OK for the empty
                // payload.
                warn!(pe = pe.id(), error = %e, "local cache read failed, issuing empty payload");
            }
        }
    }

    msg.charge(latency::ISSUE);
    debug!(pe = pe.id(), msg = %msg.describe(), "issuing");

    pe.set_current(msg.clone());
    ic.submit(msg);
    pe.set_exec_state(ExecState::Stalled);
    pe.set_resp_state(RespState::Waiting);
    pe.advance_pc();
}

fn lock<'a>(cache: &'a Mutex<LocalCache>) -> std::sync::MutexGuard<'a, LocalCache> {
    cache.lock().unwrap_or_else(PoisonError::into_inner)
}
