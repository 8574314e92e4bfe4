/*!
ArbQueue: an ordered message queue whose push IS the arbitration policy.

Rather than locking a plain deque and sorting at pop time, the ordering
function lives in `push`: FIFO appends at the tail, PRIORITY inserts
before the first element whose QoS is strictly lower than the incoming
one. Equal-QoS traffic therefore retains arrival order under both
policies, which is what makes FIFO runs reproducible and PRIORITY runs
stable.

Each queue carries its own mutex; no caller ever holds two queue locks
at once.
*/

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use crate::message::Message;

/// Arbitration disciplines supported by the fabric.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArbitScheme {
    /// First in, first out.
    Fifo,
    /// Higher QoS first; equal QoS in arrival order. Low-QoS traffic
    /// can starve under sustained high-QoS load.
    Priority,
}

/// Mutex-guarded message queue ordered by the arbitration scheme.
#[derive(Debug)]
pub struct ArbQueue {
    scheme: ArbitScheme,
    inner: Mutex<VecDeque<Message>>,
}

impl ArbQueue {
    pub fn new(scheme: ArbitScheme) -> Self {
        ArbQueue {
            scheme,
            inner: Mutex::new(VecDeque::new()),
        }
    }

    pub fn scheme(&self) -> ArbitScheme {
        self.scheme
    }

    /// Enqueue under the active policy.
    pub fn push(&self, msg: Message) {
        let mut q = self.lock();
        match self.scheme {
            ArbitScheme::Fifo => q.push_back(msg),
            ArbitScheme::Priority => {
                let at = q
                    .iter()
                    .position(|m| m.qos < msg.qos)
                    .unwrap_or(q.len());
                q.insert(at, msg);
            }
        }
    }

    /// Append at the tail regardless of policy (in-flight re-queueing).
    pub fn push_back(&self, msg: Message) {
        self.lock().push_back(msg);
    }

    /// Pop the head.
    pub fn pop(&self) -> Option<Message> {
        self.lock().pop_front()
    }

    /// Pop the first message addressed to `pe`, scanning from the head so
    /// each destination consumes its traffic in policy order.
    pub fn pop_for(&self, pe: i32) -> Option<Message> {
        let mut q = self.lock();
        let at = q.iter().position(|m| m.dest == pe)?;
        q.remove(at)
    }

    /// Whether any queued message is addressed to `pe`.
    pub fn contains_for(&self, pe: i32) -> bool {
        self.lock().iter().any(|m| m.dest == pe)
    }

    /// Remove every message matching `pred`, preserving the order of the
    /// rest. Returns the removed messages in queue order.
    pub fn drain_matching(&self, mut pred: impl FnMut(&Message) -> bool) -> Vec<Message> {
        let mut q = self.lock();
        let mut kept = VecDeque::with_capacity(q.len());
        let mut removed = Vec::new();
        while let Some(m) = q.pop_front() {
            if pred(&m) {
                removed.push(m);
            } else {
                kept.push_back(m);
            }
        }
        *q = kept;
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Message>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
