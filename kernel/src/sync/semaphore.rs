//! Counting semaphore.
//!
//! Backs the kernel-quiescence signal pair (`proc_count_mutex`,
//! `no_proc_sem`) and is generally useful wherever a bounded resource count
//! needs P/V semantics with blocking acquire.

use super::condvar::CondVar;
use super::mutex::Mutex;

pub struct Semaphore {
    count: Mutex<u64>,
    changed: CondVar,
}

impl Semaphore {
    pub fn new(initial: u64) -> Self {
        Self {
            count: Mutex::new(initial),
            changed: CondVar::new(),
        }
    }

    /// P operation: block until the count is positive, then decrement it.
    pub fn acquire(&self) {
        let mut guard = self.count.lock();
        while *guard == 0 {
            guard = self.changed.wait(guard, &self.count);
        }
        *guard -= 1;
    }

    /// Non-blocking P operation.
    pub fn try_acquire(&self) -> bool {
        let mut guard = self.count.lock();
        if *guard > 0 {
            *guard -= 1;
            true
        } else {
            false
        }
    }

    /// V operation: increment the count and wake one waiter.
    pub fn release(&self) {
        let mut guard = self.count.lock();
        *guard += 1;
        drop(guard);
        self.changed.notify_one();
    }

    pub fn count(&self) -> u64 {
        *self.count.lock()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn acquire_blocks_until_release() {
        let sem = Arc::new(Semaphore::new(0));
        let sem2 = sem.clone();

        let handle = thread::spawn(move || {
            sem2.acquire();
        });

        thread::sleep(Duration::from_millis(20));
        sem.release();
        handle.join().expect("waiter thread panicked");
    }

    #[test]
    fn try_acquire_does_not_block() {
        let sem = Semaphore::new(0);
        assert!(!sem.try_acquire());
        sem.release();
        assert!(sem.try_acquire());
    }
}
