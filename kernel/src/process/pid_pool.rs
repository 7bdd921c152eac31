//! Process identifier pool (§4.5).
//!
//! A counter starting at `PID_MIN` plus a FIFO free-list of recycled
//! identifiers, serialized by a single blocking lock. Bounded in
//! principle by `[PID_MIN, PID_MAX]`; exhaustion is surfaced as
//! `KernelError::IdentifiersExhausted` rather than panicking, since a
//! long-running system legitimately churning through that many processes
//! is a resource limit, not an invariant violation (§9).

use alloc::collections::VecDeque;

use crate::config::{PID_MAX, PID_MIN};
use crate::error::{KernelError, KernelResult};
use crate::sync::Mutex;

struct State {
    next: u32,
    free_list: VecDeque<u32>,
}

/// Identifier pool. `Sync` via the inner blocking lock; safe to share
/// behind a single reference for the whole kernel's lifetime.
pub struct PidPool {
    state: Mutex<State>,
}

impl PidPool {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next: PID_MIN,
                free_list: VecDeque::new(),
            }),
        }
    }

    /// Pop a recycled identifier if one is available; otherwise hand out
    /// the next unused one and advance the counter.
    pub fn assign(&self) -> KernelResult<u32> {
        let mut state = self.state.lock();
        if let Some(pid) = state.free_list.pop_front() {
            return Ok(pid);
        }
        if state.next > PID_MAX {
            return Err(KernelError::IdentifiersExhausted);
        }
        let pid = state.next;
        state.next += 1;
        Ok(pid)
    }

    /// Recycle `pid` for a future `assign`.
    pub fn release(&self, pid: u32) {
        debug_assert!((PID_MIN..=PID_MAX).contains(&pid));
        self.state.lock().free_list.push_back(pid);
    }
}

impl Default for PidPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assigns_from_pid_min_first() {
        let pool = PidPool::new();
        assert_eq!(pool.assign().unwrap(), PID_MIN);
        assert_eq!(pool.assign().unwrap(), PID_MIN + 1);
    }

    #[test]
    fn release_then_assign_recycles_fifo() {
        let pool = PidPool::new();
        let a = pool.assign().unwrap();
        let b = pool.assign().unwrap();
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.assign().unwrap(), a);
        assert_eq!(pool.assign().unwrap(), b);
    }

    #[test]
    fn exhaustion_is_reported_not_panicked() {
        let pool = PidPool::new();
        for _ in PID_MIN..=PID_MAX {
            pool.assign().unwrap();
        }
        assert!(matches!(pool.assign(), Err(KernelError::IdentifiersExhausted)));
    }
}
