/*!
Interconnect worker: the guarded per-cycle pass of the fabric.

Per tick: check the termination predicate, short-circuit when idle, drop
dead letters, age the in-flight queue, then admit and dispatch exactly
one message. Admission happening after the pipeline advance means a
freshly admitted message never loses a latency cycle in the same tick it
entered.
*/

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info};

use crate::clock::StepClock;
use crate::interconnect::{IcState, Interconnect, dispatch};
use crate::memory::SharedMemory;
use crate::pe::ExecBoard;

/// Run the interconnect to completion. Blocks only inside the clock.
pub(crate) fn run(
    ic: &Interconnect,
    shared: &Mutex<SharedMemory>,
    clock: &StepClock,
    board: &ExecBoard,
    halt: &AtomicBool,
) {
    info!(
        scheme = ?ic.scheme(),
        pes = ic.total_pes(),
        "interconnect worker starting"
    );

    let mut last_step = 0;
    loop {
        last_step = clock.await_next(last_step);
        if halt.load(Ordering::Relaxed) {
            break;
        }

        // Termination: every PE done and nothing left to move.
        if board.all_finished() && ic.all_queues_empty() {
            ic.set_state(IcState::Finished);
            info!("all PEs finished and queues drained");
            break;
        }

        if ic.all_queues_empty() {
            ic.set_state(IcState::Idle);
            continue;
        }
        ic.set_state(IcState::Processing);

        // A destination outside the configured PE range has no worker at
        // all; treat it like a finished one and drop the message.
        dispatch::sweep_dead_letters(ic, |pe| pe >= ic.total_pes() || board.is_finished(pe));

        ic.advance_pipeline();

        if let Some(msg) = ic.pop_admission() {
            let mut mem = shared.lock().unwrap_or_else(PoisonError::into_inner);
            dispatch::admit(ic, &mut mem, msg);
        }

        let (inq, mid, out) = ic.queue_depths();
        debug!(step = last_step, inq, mid, out, "interconnect pass done");
        if ic.all_queues_empty() {
            ic.set_state(IcState::Idle);
        }
    }

    info!("interconnect worker exiting");
}
