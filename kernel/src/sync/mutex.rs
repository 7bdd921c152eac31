//! Blocking lock: the cross-thread, may-sleep-while-waiting primitive.
//!
//! Used wherever a thread may need to wait for another thread to make
//! progress — the identifier pool, a process's `wait_lock`, the
//! intersection synchronizer's entry lock. Unlike `SpinLock`, acquiring
//! this lock is a suspension point (see the concurrency model's list of
//! suspension points).
//!
//! On a hosted build this is a thin wrapper over `std::sync::Mutex` so
//! tests get genuine OS-thread blocking. On bare metal there is no
//! scheduler in this nucleus to hand the processor to, so the wait is a
//! spin loop — a "trivially reimplemented" primitive, per design, not a
//! true descheduling wait.

#[cfg(not(target_os = "none"))]
mod imp {
    use std::sync::{Mutex as StdMutex, MutexGuard as StdGuard};

    pub struct Mutex<T> {
        pub(super) inner: StdMutex<T>,
    }

    pub struct MutexGuard<'a, T> {
        pub(super) guard: StdGuard<'a, T>,
    }

    impl<T> Mutex<T> {
        pub fn new(value: T) -> Self {
            Self {
                inner: StdMutex::new(value),
            }
        }

        pub fn lock(&self) -> MutexGuard<'_, T> {
            MutexGuard {
                guard: self.inner.lock().expect("blocking lock poisoned"),
            }
        }
    }

    impl<T> core::ops::Deref for MutexGuard<'_, T> {
        type Target = T;
        fn deref(&self) -> &T {
            &self.guard
        }
    }

    impl<T> core::ops::DerefMut for MutexGuard<'_, T> {
        fn deref_mut(&mut self) -> &mut T {
            &mut self.guard
        }
    }

    impl<'a, T> MutexGuard<'a, T> {
        /// Re-exposed for `CondVar::wait`: releases the mutex for the
        /// duration of the wait and re-acquires it before returning.
        pub(crate) fn condvar_wait(self, cv: &std::sync::Condvar) -> Self {
            MutexGuard {
                guard: cv.wait(self.guard).expect("condvar wait poisoned"),
            }
        }
    }
}

#[cfg(target_os = "none")]
mod imp {
    use spin::{Mutex as InnerMutex, MutexGuard as InnerGuard};

    pub struct Mutex<T> {
        pub(super) inner: InnerMutex<T>,
    }

    pub struct MutexGuard<'a, T> {
        pub(super) guard: InnerGuard<'a, T>,
    }

    impl<T> Mutex<T> {
        pub const fn new(value: T) -> Self {
            Self {
                inner: InnerMutex::new(value),
            }
        }

        pub fn lock(&self) -> MutexGuard<'_, T> {
            // No scheduler to yield to in this nucleus; spin until free.
            loop {
                if let Some(guard) = self.inner.try_lock() {
                    return MutexGuard { guard };
                }
                core::hint::spin_loop();
            }
        }
    }

    impl<T> core::ops::Deref for MutexGuard<'_, T> {
        type Target = T;
        fn deref(&self) -> &T {
            &self.guard
        }
    }

    impl<T> core::ops::DerefMut for MutexGuard<'_, T> {
        fn deref_mut(&mut self) -> &mut T {
            &mut self.guard
        }
    }
}

pub use imp::{Mutex, MutexGuard};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutates_under_lock() {
        let m = Mutex::new(vec![1, 2, 3]);
        m.lock().push(4);
        assert_eq!(*m.lock(), vec![1, 2, 3, 4]);
    }
}
