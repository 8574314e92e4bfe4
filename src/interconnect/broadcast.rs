/*!
BroadcastRegistry: live invalidation broadcasts and their ack counts.

A record is born atomically with `pending_acks` equal to the fanout width
and dies the instant the count reaches zero; `account_ack` reports the
death so the caller can emit exactly one INV_COMPLETE. Ids come from a
monotonic generator, so a live and a dead broadcast never share one.
*/

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Outcome of accounting one INV_ACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Acks still outstanding.
    Pending(u32),
    /// Last ack arrived; the record is gone. Emit INV_COMPLETE to the
    /// origin.
    Complete { origin: usize },
}

#[derive(Debug)]
struct PendingBroadcast {
    origin: usize,
    pending_acks: u32,
}

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: u32,
    live: HashMap<u32, PendingBroadcast>,
}

/// Mapping broadcast id -> {origin PE, pending ack count}.
#[derive(Debug, Default)]
pub struct BroadcastRegistry {
    inner: Mutex<RegistryInner>,
}

impl BroadcastRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new broadcast from `origin` fanned out to `fanout`
    /// receivers. Returns the fresh id (ids start at 1; 0 means "no
    /// broadcast" on the wire).
    pub fn register(&self, origin: usize, fanout: u32) -> u32 {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.live.insert(
            id,
            PendingBroadcast {
                origin,
                pending_acks: fanout,
            },
        );
        id
    }

    /// Account one ack against `id`. `None` means the id is unknown, a
    /// protocol violation the caller logs and drops.
    pub fn account_ack(&self, id: u32) -> Option<AckOutcome> {
        let mut inner = self.lock();
        let entry = inner.live.get_mut(&id)?;
        entry.pending_acks -= 1;
        if entry.pending_acks == 0 {
            let origin = entry.origin;
            inner.live.remove(&id);
            Some(AckOutcome::Complete { origin })
        } else {
            Some(AckOutcome::Pending(entry.pending_acks))
        }
    }

    /// Number of live broadcasts.
    pub fn live_count(&self) -> usize {
        self.lock().live.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_and_unique() {
        let reg = BroadcastRegistry::new();
        let a = reg.register(0, 4);
        let b = reg.register(1, 4);
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(reg.live_count(), 2);
    }

    #[test]
    fn record_dies_on_last_ack() {
        let reg = BroadcastRegistry::new();
        let id = reg.register(2, 3);

        assert_eq!(reg.account_ack(id), Some(AckOutcome::Pending(2)));
        assert_eq!(reg.account_ack(id), Some(AckOutcome::Pending(1)));
        assert_eq!(
            reg.account_ack(id),
            Some(AckOutcome::Complete { origin: 2 })
        );
        assert_eq!(reg.live_count(), 0);

        // The id is gone; further acks are protocol violations.
        assert_eq!(reg.account_ack(id), None);
    }

    #[test]
    fn unknown_id_is_rejected() {
        let reg = BroadcastRegistry::new();
        assert_eq!(reg.account_ack(42), None);
    }
}
