//! Spinlock: the short-critical-section primitive.
//!
//! Protects pointer-sized updates — address-space swaps, a children list's
//! head pointer — that must never be held across a blocking operation. On
//! real hardware the acquiring processor also masks interrupts for the
//! duration of the critical section; that part of the contract is the
//! trap-dispatch glue's responsibility and is not modeled here.

use spin::{Mutex, MutexGuard};

/// A short-held mutual-exclusion lock. Never acquire this and then block.
pub struct SpinLock<T> {
    inner: Mutex<T>,
}

impl<T> SpinLock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Acquire the lock, spinning until it is free.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock()
    }

    /// Acquire the lock without blocking.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        self.inner.try_lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutual_exclusion() {
        let lock = SpinLock::new(0u32);
        {
            let mut guard = lock.lock();
            *guard += 1;
        }
        assert_eq!(*lock.lock(), 1);
    }

    #[test]
    fn try_lock_fails_while_held() {
        let lock = SpinLock::new(());
        let _guard = lock.lock();
        assert!(lock.try_lock().is_none());
    }
}
