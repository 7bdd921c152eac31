//! Synchronization primitives.
//!
//! Everything in §2's "Primitives" leaf: a spinlock for short critical
//! sections, a blocking lock + condition variable for cross-thread waits,
//! and a counting semaphore built on top of them. These are assumed
//! correct by the rest of the kernel and kept deliberately small.

pub mod condvar;
pub mod mutex;
pub mod semaphore;
pub mod spinlock;

pub use condvar::CondVar;
pub use mutex::{Mutex, MutexGuard};
pub use semaphore::Semaphore;
pub use spinlock::SpinLock;
