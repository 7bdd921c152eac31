//! Injectable randomness for the intersection synchronizer's anti-
//! starvation tie-break (§9: "make the RNG source injectable to make the
//! test suite deterministic").

use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use alloc::vec::Vec;

/// A source of single-bit randomness. `Send + Sync` so an `Intersection`
/// can share it across the threads calling `after_exit`.
pub trait RandomSource: Send + Sync {
    fn next_bool(&self) -> bool;
}

/// Default production source: a xorshift64* generator. Seeded once at
/// construction; this nucleus has no entropy collaborator, so the seed
/// is a fixed constant rather than drawn from hardware. That is fine for
/// its one job — breaking ties between otherwise-equal waiters — but it
/// means the broadcast order is not adversarially unpredictable, only
/// statistically varied.
pub struct XorshiftRandomSource {
    state: AtomicU64,
}

impl XorshiftRandomSource {
    pub const fn new(seed: u64) -> Self {
        Self {
            state: AtomicU64::new(if seed == 0 { 1 } else { seed }),
        }
    }
}

impl RandomSource for XorshiftRandomSource {
    fn next_bool(&self) -> bool {
        let mut x = self.state.load(Ordering::Relaxed);
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state.store(x, Ordering::Relaxed);
        x & 1 == 1
    }
}

/// A fixed, cyclic sequence of answers. Used by the test suite to pin
/// down `after_exit`'s broadcast order deterministically.
pub struct ScriptedRandomSource {
    script: Vec<bool>,
    cursor: AtomicUsize,
}

impl ScriptedRandomSource {
    pub fn new(script: Vec<bool>) -> Self {
        assert!(!script.is_empty(), "scripted random source needs at least one answer");
        Self {
            script,
            cursor: AtomicUsize::new(0),
        }
    }
}

impl RandomSource for ScriptedRandomSource {
    fn next_bool(&self) -> bool {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.script.len();
        self.script[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_source_cycles() {
        let rng = ScriptedRandomSource::new(alloc::vec![true, false]);
        assert!(rng.next_bool());
        assert!(!rng.next_bool());
        assert!(rng.next_bool());
    }

    #[test]
    fn xorshift_is_deterministic_given_a_seed() {
        let a = XorshiftRandomSource::new(42);
        let b = XorshiftRandomSource::new(42);
        for _ in 0..10 {
            assert_eq!(a.next_bool(), b.next_bool());
        }
    }
}
