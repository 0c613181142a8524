//! Lock array handed to a crypto library that asks its host for locking.
//!
//! # Design
//! Crypto libraries of this kind call back with separate "lock n" and
//! "unlock n" requests, so a slot cannot be an RAII guard. Each slot is a
//! binary semaphore built from a `Mutex<bool>` and a `Condvar`.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use tracing::warn;

use crate::error::InitError;

/// Bit set in `mode` when the callback asks for the lock to be taken.
pub const LOCK: i32 = 1;
/// Bit set in `mode` when the callback asks for the lock to be released.
pub const UNLOCK: i32 = 2;

#[derive(Debug, Default)]
struct Slot {
    held: Mutex<bool>,
    released: Condvar,
}

impl Slot {
    fn state(&self) -> MutexGuard<'_, bool> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fixed-size table of locks, one per index the crypto library requests.
#[derive(Debug)]
pub struct LockTable {
    slots: Box<[Slot]>,
}

impl LockTable {
    /// Allocate `count` locks. Allocation failure is reported, not aborted on.
    pub fn new(count: usize) -> Result<Self, InitError> {
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(count)
            .map_err(|_| InitError::LockAllocation { count })?;
        slots.extend((0..count).map(|_| Slot::default()));
        Ok(Self {
            slots: slots.into_boxed_slice(),
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Block until lock `n` is free, then take it.
    pub fn lock(&self, n: usize) {
        let Some(slot) = self.slot(n) else { return };
        let mut held = slot.state();
        while *held {
            held = slot
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *held = true;
    }

    /// Release lock `n` and wake one waiter.
    pub fn unlock(&self, n: usize) {
        let Some(slot) = self.slot(n) else { return };
        *slot.state() = false;
        slot.released.notify_one();
    }

    /// Callback entry point: dispatch on the `LOCK` bit of `mode`.
    pub fn locking(&self, mode: i32, n: usize) {
        if mode & LOCK != 0 {
            self.lock(n);
        } else {
            self.unlock(n);
        }
    }

    fn slot(&self, n: usize) -> Option<&Slot> {
        let slot = self.slots.get(n);
        if slot.is_none() {
            warn!(index = n, len = self.slots.len(), "crypto lock index out of range");
        }
        slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn table_is_sized_by_count() {
        let table = LockTable::new(41).unwrap();
        assert_eq!(table.len(), 41);
        assert!(!table.is_empty());
        assert!(LockTable::new(0).unwrap().is_empty());
    }

    #[test]
    fn unreasonable_count_is_an_allocation_error() {
        let err = LockTable::new(usize::MAX).unwrap_err();
        assert!(matches!(err, InitError::LockAllocation { count } if count == usize::MAX));
    }

    #[test]
    fn out_of_range_index_is_ignored() {
        let table = LockTable::new(2).unwrap();
        table.locking(LOCK, 7);
        table.locking(UNLOCK, 7);
    }

    #[test]
    fn lock_and_unlock_may_come_from_separate_calls() {
        let table = LockTable::new(1).unwrap();
        table.locking(LOCK, 0);
        table.locking(UNLOCK, 0);
        table.locking(LOCK | 4, 0);
        table.locking(UNLOCK, 0);
    }

    #[test]
    fn locking_serializes_threads_on_the_same_index() {
        let table = Arc::new(LockTable::new(3).unwrap());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = Arc::clone(&table);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    for _ in 0..200 {
                        table.locking(LOCK, 2);
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        inside.fetch_sub(1, Ordering::SeqCst);
                        table.locking(UNLOCK, 2);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }
}
