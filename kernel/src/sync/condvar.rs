//! Condition variable paired with [`Mutex`](super::Mutex).
//!
//! Used by `wait_cv` (process exit/waitpid), the intersection
//! synchronizer's per-origin queues, and anywhere else the design calls
//! for "wait on a predicate under a blocking lock".

use super::mutex::{Mutex, MutexGuard};

#[cfg(not(target_os = "none"))]
mod imp {
    use super::{Mutex, MutexGuard};

    pub struct CondVar {
        inner: std::sync::Condvar,
    }

    impl CondVar {
        pub fn new() -> Self {
            Self {
                inner: std::sync::Condvar::new(),
            }
        }

        pub fn wait<'a, T>(
            &self,
            guard: MutexGuard<'a, T>,
            _lock: &'a Mutex<T>,
        ) -> MutexGuard<'a, T> {
            guard.condvar_wait(&self.inner)
        }

        pub fn notify_one(&self) {
            self.inner.notify_one();
        }

        pub fn notify_all(&self) {
            self.inner.notify_all();
        }
    }
}

#[cfg(target_os = "none")]
mod imp {
    use core::sync::atomic::{AtomicU64, Ordering};

    use super::{Mutex, MutexGuard};

    /// Generation-counter condvar: no wait queue, just a monotonically
    /// increasing counter bumped on every notify. A waiter spins until the
    /// counter it observed before sleeping has moved. Correct but not fair
    /// and not efficient — acceptable for a primitive with no scheduler
    /// underneath it to hand the processor to.
    pub struct CondVar {
        generation: AtomicU64,
    }

    impl CondVar {
        pub const fn new() -> Self {
            Self {
                generation: AtomicU64::new(0),
            }
        }

        pub fn wait<'a, T>(&self, guard: MutexGuard<'a, T>, lock: &'a Mutex<T>) -> MutexGuard<'a, T> {
            let observed = self.generation.load(Ordering::SeqCst);
            drop(guard);
            while self.generation.load(Ordering::SeqCst) == observed {
                core::hint::spin_loop();
            }
            lock.lock()
        }

        pub fn notify_one(&self) {
            self.generation.fetch_add(1, Ordering::SeqCst);
        }

        pub fn notify_all(&self) {
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
    }
}

pub use imp::CondVar;

impl Default for CondVar {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn wakes_a_waiter() {
        let lock = Arc::new(Mutex::new(false));
        let cv = Arc::new(CondVar::new());

        let (lock2, cv2) = (lock.clone(), cv.clone());
        let handle = thread::spawn(move || {
            let mut guard = lock2.lock();
            while !*guard {
                guard = cv2.wait(guard, &lock2);
            }
        });

        thread::sleep(Duration::from_millis(20));
        *lock.lock() = true;
        cv.notify_all();

        handle.join().expect("waiter thread panicked");
    }
}
