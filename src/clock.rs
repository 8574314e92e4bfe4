/*!
Stepping clock: the barrier-like tick that paces every worker.

A single monotonic counter behind a mutex/condvar pair. The driver calls
`advance()` once per simulated cycle (on an operator keypress in stepping
mode, in a tight loop in auto-run); each worker calls `await_next` with
the last value it handled and performs one guarded pass when the counter
moves past it. `await_next` is the only blocking call any worker makes.

A worker that takes longer than one driver tick simply observes a larger
counter on its next wait and still performs a single pass; ticks are a
pace, not a work queue.
*/

use std::sync::{Condvar, Mutex, PoisonError};

/// Monotonic cycle counter with condvar wakeups.
#[derive(Debug, Default)]
pub struct StepClock {
    step: Mutex<u64>,
    advanced: Condvar,
}

impl StepClock {
    pub fn new() -> Self {
        StepClock {
            step: Mutex::new(0),
            advanced: Condvar::new(),
        }
    }

    /// Current counter value without waiting.
    pub fn current(&self) -> u64 {
        *self.step.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Advance one cycle and wake every waiter.
    pub fn advance(&self) {
        {
            let mut step = self.step.lock().unwrap_or_else(PoisonError::into_inner);
            *step += 1;
        }
        self.advanced.notify_all();
    }

    /// Block until the counter exceeds `last_seen`; returns the new value.
    pub fn await_next(&self, last_seen: u64) -> u64 {
        let mut step = self.step.lock().unwrap_or_else(PoisonError::into_inner);
        while *step <= last_seen {
            step = self
                .advanced
                .wait(step)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *step
    }
}
