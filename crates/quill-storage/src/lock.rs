//! Per-proposal mutation locks.

use parking_lot::Mutex;
use quill_types::ProposalId;
use std::collections::HashMap;
use std::sync::Arc;

/// Exclusive, proposal-scoped locks.
///
/// Every mutation of a proposal (commit, merge, pull-request transition,
/// contributor change) runs inside [`ProposalLocks::with`] for that proposal.
/// Locks of different proposals are independent; no operation ever holds two.
/// The locks are not reentrant. A slot lives only while some caller holds or
/// waits for it, so the table stays as small as the current contention.
#[derive(Debug, Default)]
pub struct ProposalLocks {
    locks: Mutex<HashMap<ProposalId, Arc<Mutex<()>>>>,
}

impl ProposalLocks {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: ProposalId) -> Arc<Mutex<()>> {
        self.locks.lock().entry(id).or_default().clone()
    }

    /// Runs `f` while holding the exclusive lock of `id`.
    pub fn with<R>(&self, id: ProposalId, f: impl FnOnce() -> R) -> R {
        let slot = self.slot(id);
        let result = {
            let _guard = slot.lock();
            f()
        };
        self.release(id, slot);
        result
    }

    fn release(&self, id: ProposalId, slot: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock();
        // One reference in the table, one here: nobody else is waiting.
        if Arc::strong_count(&slot) == 2 {
            locks.remove(&id);
        }
    }

    /// Returns true if someone currently holds the lock of `id`.
    pub fn is_locked(&self, id: ProposalId) -> bool {
        self.locks
            .lock()
            .get(&id)
            .is_some_and(|slot| slot.is_locked())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_same_proposal_is_serialized() {
        let locks = Arc::new(ProposalLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let inside = inside.clone();
                let max_seen = max_seen.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        locks.with(ProposalId::new(1), || {
                            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                            max_seen.fetch_max(now, Ordering::SeqCst);
                            inside.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_different_proposals_do_not_block() {
        let locks = ProposalLocks::new();
        locks.with(ProposalId::new(1), || {
            assert!(locks.is_locked(ProposalId::new(1)));
            // Would deadlock if proposals shared a lock.
            locks.with(ProposalId::new(2), || {
                assert!(locks.is_locked(ProposalId::new(2)));
            });
        });
        assert!(!locks.is_locked(ProposalId::new(1)));
    }

    #[test]
    fn test_idle_slots_are_pruned() {
        let locks = Arc::new(ProposalLocks::new());
        for id in 0..100 {
            locks.with(ProposalId::new(id), || {});
        }
        assert!(locks.locks.lock().is_empty());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let locks = locks.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        locks.with(ProposalId::new(7), || {});
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(locks.locks.lock().is_empty());
    }
}
