//! Kernel-quiescence signal (§4.7).
//!
//! A counting semaphore pair in the original's own idiom: `count_mutex`
//! (initial 1) guards the user-process census, `no_proc` (initial 0) is
//! posted exactly once per positive-to-zero transition. The menu thread
//! blocks on `wait_for_quiescence` until the last user process exits.

use core::cell::UnsafeCell;

use crate::sync::Semaphore;

/// Counts live user processes (the kernel process itself is never
/// counted — see §4.4's bootstrap note) and signals when that count
/// drops to zero.
pub struct ProcessCensus {
    count_mutex: Semaphore,
    count: UnsafeCell<u64>,
    no_proc: Semaphore,
}

// SAFETY: `count` is only ever read or written while `count_mutex` is
// held (acquired, then released after the access), which serializes
// every access the same way a lock's guard would.
unsafe impl Sync for ProcessCensus {}

impl ProcessCensus {
    pub fn new() -> Self {
        Self {
            count_mutex: Semaphore::new(1),
            count: UnsafeCell::new(0),
            no_proc: Semaphore::new(0),
        }
    }

    /// A new user process was created.
    pub fn increment(&self) {
        self.count_mutex.acquire();
        // SAFETY: the semaphore above is held for exactly this access.
        unsafe {
            *self.count.get() += 1;
        }
        self.count_mutex.release();
    }

    /// A user process was destroyed. If the census reaches zero, wakes
    /// exactly one `wait_for_quiescence` caller.
    pub fn decrement(&self) {
        self.count_mutex.acquire();
        // SAFETY: the semaphore above is held for exactly this access.
        let reached_zero = unsafe {
            let count = &mut *self.count.get();
            assert!(*count > 0, "process census underflow");
            *count -= 1;
            *count == 0
        };
        self.count_mutex.release();
        if reached_zero {
            self.no_proc.release();
        }
    }

    /// Block until the census has transitioned to zero at least once
    /// since the last call.
    pub fn wait_for_quiescence(&self) {
        self.no_proc.acquire();
    }

    #[cfg(test)]
    pub fn count(&self) -> u64 {
        self.count_mutex.acquire();
        // SAFETY: the semaphore above is held for exactly this access.
        let value = unsafe { *self.count.get() };
        self.count_mutex.release();
        value
    }
}

impl Default for ProcessCensus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn signals_exactly_once_per_zero_transition() {
        let census = Arc::new(ProcessCensus::new());
        census.increment();
        census.increment();

        let waiter = Arc::clone(&census);
        let handle = thread::spawn(move || {
            waiter.wait_for_quiescence();
        });

        census.decrement();
        assert_eq!(census.count(), 1);
        census.decrement();

        handle.join().expect("quiescence waiter panicked");
        assert_eq!(census.count(), 0);
    }
}
