/*!
Processing Element: state machine over a pre-decoded instruction stream.

A PE holds a program counter, an execution state, a response state and at
most one outstanding transaction. The worker (`worker` module) drives one
guarded pass per clock tick; `decode` turns 64-bit instruction words into
request messages.

The `ExecBoard` publishes each PE's execution state across threads: the
interconnect's termination check and the driver loop read it, each PE
writes only its own slot.
*/

pub mod decode;
pub mod worker;

use std::sync::{Mutex, PoisonError};

use crate::message::Message;

/// Execution states of a PE.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExecState {
    /// No transaction in flight; ready to fetch.
    Idle,
    /// Fetch/decode/issue in progress this cycle.
    Running,
    /// A request is outstanding; the PE is blocked on its response.
    Stalled,
    /// The stream is exhausted (or abandoned); the worker has exited.
    Finished,
}

/// Response-side states of a PE.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RespState {
    /// No outstanding transaction.
    Ready,
    /// A response is expected.
    Waiting,
    /// A response is being handled this cycle.
    Processing,
    /// The closing response was handled.
    Completed,
}

/// One Processing Element.
#[derive(Debug)]
pub struct Pe {
    id: usize,
    qos: u8,
    pc: usize,
    program: Vec<u64>,
    exec: ExecState,
    resp: RespState,
    /// The request currently in flight, if any.
    current: Option<Message>,
}

impl Pe {
    pub fn new(id: usize, qos: u8, program: Vec<u64>) -> Self {
        Pe {
            id,
            qos,
            pc: 0,
            program,
            exec: ExecState::Idle,
            resp: RespState::Ready,
            current: None,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn qos(&self) -> u8 {
        self.qos
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn program_len(&self) -> usize {
        self.program.len()
    }

    /// The word under the program counter, if the stream has one left.
    pub fn fetch(&self) -> Option<u64> {
        self.program.get(self.pc).copied()
    }

    pub fn advance_pc(&mut self) {
        self.pc += 1;
    }

    pub fn exec_state(&self) -> ExecState {
        self.exec
    }

    pub fn set_exec_state(&mut self, s: ExecState) {
        self.exec = s;
    }

    pub fn resp_state(&self) -> RespState {
        self.resp
    }

    pub fn set_resp_state(&mut self, s: RespState) {
        self.resp = s;
    }

    pub fn current(&self) -> Option<&Message> {
        self.current.as_ref()
    }

    pub fn set_current(&mut self, msg: Message) {
        self.current = Some(msg);
    }

    pub fn clear_current(&mut self) {
        self.current = None;
    }

    /// The termination predicate, in one place: the stream is exhausted,
    /// nothing is outstanding, no response is expected, and (per the
    /// caller's answer) nothing bound for this PE sits in flight or in
    /// egress.
    pub fn finish_predicate(&self, pending_for_self: bool) -> bool {
        self.pc >= self.program.len()
            && self.exec != ExecState::Stalled
            && self.resp != RespState::Waiting
            && !pending_for_self
    }
}

/// Cross-thread view of every PE's execution state.
///
/// Each worker writes only its own slot; the interconnect worker and the
/// driver read the whole board for the termination predicate.
#[derive(Debug)]
pub struct ExecBoard {
    states: Mutex<Vec<ExecState>>,
}

impl ExecBoard {
    pub fn new(pe_count: usize) -> Self {
        ExecBoard {
            states: Mutex::new(vec![ExecState::Idle; pe_count]),
        }
    }

    pub fn set(&self, pe: usize, s: ExecState) {
        self.lock()[pe] = s;
    }

    pub fn get(&self, pe: usize) -> ExecState {
        self.lock()[pe]
    }

    pub fn is_finished(&self, pe: usize) -> bool {
        self.get(pe) == ExecState::Finished
    }

    pub fn all_finished(&self) -> bool {
        self.lock().iter().all(|&s| s == ExecState::Finished)
    }

    /// Put every slot back to Idle (start of a fresh run).
    pub fn reset(&self) {
        self.lock().fill(ExecState::Idle);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ExecState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
