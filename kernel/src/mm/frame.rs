//! Coremap and physical frame allocator.
//!
//! A coremap is just an array indexed by frame number recording allocation
//! state; the allocator over it is strict first-fit over contiguous runs.
//! No buddy system, no bitmap, no NUMA zones — this nucleus explicitly
//! excludes page replacement and swap, so the simplest allocator that
//! satisfies the allocate/free contract is the right one.

use alloc::vec::Vec;

use crate::collaborators::Collaborators;
use crate::config::PAGE_SIZE;
use crate::error::{KernelError, KernelResult};
use crate::sync::SpinLock;

/// A physical address. Always page-aligned when it names a frame base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PhysicalAddress(u64);

impl PhysicalAddress {
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub const fn is_page_aligned(self) -> bool {
        self.0 & (PAGE_SIZE as u64 - 1) == 0
    }
}

/// An index into the coremap. Distinct from `PhysicalAddress` so the two
/// are never accidentally interchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FrameNumber(usize);

impl FrameNumber {
    pub const fn new(n: usize) -> Self {
        Self(n)
    }

    pub const fn as_usize(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy)]
struct FrameEntry {
    available: bool,
    contiguous: bool,
    run_length: u32,
}

impl FrameEntry {
    const fn free() -> Self {
        Self {
            available: true,
            contiguous: false,
            run_length: 0,
        }
    }
}

struct CoremapState {
    /// Physical address of frame 0.
    base: PhysicalAddress,
    frames: Vec<FrameEntry>,
}

impl CoremapState {
    fn frame_address(&self, index: usize) -> PhysicalAddress {
        PhysicalAddress::new(self.base.as_u64() + (index * PAGE_SIZE) as u64)
    }

    fn index_of(&self, addr: PhysicalAddress) -> Option<usize> {
        let offset = addr.as_u64().checked_sub(self.base.as_u64())?;
        if offset % PAGE_SIZE as u64 != 0 {
            return None;
        }
        let index = (offset / PAGE_SIZE as u64) as usize;
        if index < self.frames.len() {
            Some(index)
        } else {
            None
        }
    }

    fn available_count(&self) -> usize {
        self.frames.iter().filter(|f| f.available).count()
    }

    /// Strict first-fit scan for `n` consecutive available frames.
    fn find_run(&self, n: usize) -> Option<usize> {
        if n == 0 || n > self.frames.len() {
            return None;
        }
        let mut run_start = 0usize;
        let mut run_len = 0usize;
        for (i, frame) in self.frames.iter().enumerate() {
            if frame.available {
                if run_len == 0 {
                    run_start = i;
                }
                run_len += 1;
                if run_len == n {
                    return Some(run_start);
                }
            } else {
                run_len = 0;
            }
        }
        None
    }
}

/// The coremap-backed frame allocator, serialized by one spinlock as the
/// design requires.
pub struct FrameAllocator {
    state: SpinLock<Option<CoremapState>>,
}

impl FrameAllocator {
    pub const fn uninitialized() -> Self {
        Self {
            state: SpinLock::new(None),
        }
    }

    /// Bootstrap the coremap over `[lo, hi)`. The first
    /// `frame_count * size_of::<FrameEntry>()` bytes, rounded up to a page,
    /// are reserved for the coremap's own storage; the remaining frames
    /// start out available.
    pub fn bootstrap(&self, lo: PhysicalAddress, hi: PhysicalAddress) {
        assert!(lo.is_page_aligned() && hi.is_page_aligned());
        assert!(hi.as_u64() > lo.as_u64());

        let total_frames = ((hi.as_u64() - lo.as_u64()) / PAGE_SIZE as u64) as usize;
        let entry_size = core::mem::size_of::<FrameEntry>();
        let coremap_bytes = total_frames * entry_size;
        let coremap_pages = coremap_bytes.div_ceil(PAGE_SIZE);
        let usable_frames = total_frames - coremap_pages;

        let base = PhysicalAddress::new(lo.as_u64() + (coremap_pages * PAGE_SIZE) as u64);
        let frames = alloc::vec![FrameEntry::free(); usable_frames];

        *self.state.lock() = Some(CoremapState { base, frames });
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.state.lock().is_some()
    }

    /// Allocate `n` contiguous frames, first-fit. Returns the base address
    /// of the run.
    ///
    /// Before `bootstrap` has run, there is no coremap to scan yet; this
    /// falls through to the primitive `steal_memory` (§4.1), the
    /// unstructured early-boot pool every real port carves physical
    /// memory from before the VM subsystem itself is up.
    pub fn allocate_frames(&self, n: usize, collaborators: &dyn Collaborators) -> KernelResult<PhysicalAddress> {
        let mut guard = self.state.lock();
        let state = match guard.as_mut() {
            Some(state) => state,
            None => {
                return collaborators
                    .steal_memory(n)
                    .ok_or(KernelError::OutOfMemory { requested: n, available: 0 });
            }
        };

        let available = state.available_count();
        let start = state
            .find_run(n)
            .ok_or(KernelError::OutOfMemory {
                requested: n,
                available,
            })?;

        for (offset, frame) in state.frames[start..start + n].iter_mut().enumerate() {
            frame.available = false;
            frame.contiguous = true;
            frame.run_length = if offset == 0 { n as u32 } else { 0 };
        }

        Ok(state.frame_address(start))
    }

    /// Free the run that starts at `addr`. `addr` must be the base
    /// returned by a prior `allocate_frames` call; freeing a mid-run
    /// address is a caller bug and panics.
    ///
    /// Before `bootstrap` has run, `addr` can only have come from the
    /// `steal_memory` fallback above, and `steal_memory`'s early-boot
    /// pool (§1) has no matching "give memory back" primitive — freeing
    /// it is a no-op rather than a panic, since it is not a caller bug.
    pub fn free_frames(&self, addr: PhysicalAddress) {
        let mut guard = self.state.lock();
        let state = match guard.as_mut() {
            Some(state) => state,
            None => return,
        };

        let start = state
            .index_of(addr)
            .expect("free_frames: address not in coremap range");
        let run_length = state.frames[start].run_length;
        assert!(
            run_length > 0,
            "free_frames: address is not a run start (contract violation)"
        );

        for frame in &mut state.frames[start..start + run_length as usize] {
            frame.available = true;
            frame.contiguous = false;
            frame.run_length = 0;
        }
    }

    #[cfg(test)]
    fn run_length_at(&self, addr: PhysicalAddress) -> u32 {
        let guard = self.state.lock();
        let state = guard.as_ref().unwrap();
        let idx = state.index_of(addr).unwrap();
        state.frames[idx].run_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::fake::FakeCollaborators;

    fn new_allocator(frame_count: usize) -> FrameAllocator {
        let alloc = FrameAllocator::uninitialized();
        let entry_size = core::mem::size_of::<FrameEntry>();
        let coremap_pages = (frame_count * entry_size).div_ceil(PAGE_SIZE);
        let lo = PhysicalAddress::new(0);
        let hi = PhysicalAddress::new(((frame_count + coremap_pages) * PAGE_SIZE) as u64);
        alloc.bootstrap(lo, hi);
        alloc
    }

    #[test]
    fn first_fit_reuses_freed_run() {
        // Scenario 1 from the testable-properties list: allocate 3, 2, 1;
        // free the middle (size-2) run; allocate 2 again and expect the
        // same base back.
        let alloc = new_allocator(16);
        let collaborators = FakeCollaborators::new(16 * PAGE_SIZE);

        let a = alloc.allocate_frames(3, &collaborators).unwrap();
        let b = alloc.allocate_frames(2, &collaborators).unwrap();
        let _c = alloc.allocate_frames(1, &collaborators).unwrap();

        alloc.free_frames(b);
        let b2 = alloc.allocate_frames(2, &collaborators).unwrap();

        assert_eq!(b, b2);
        assert_ne!(a, b2);
    }

    #[test]
    fn run_length_recorded_only_on_first_frame() {
        let alloc = new_allocator(8);
        let collaborators = FakeCollaborators::new(8 * PAGE_SIZE);
        let base = alloc.allocate_frames(4, &collaborators).unwrap();
        assert_eq!(alloc.run_length_at(base), 4);

        let second = PhysicalAddress::new(base.as_u64() + PAGE_SIZE as u64);
        assert_eq!(alloc.run_length_at(second), 0);
    }

    #[test]
    fn out_of_memory_when_no_run_fits() {
        let alloc = new_allocator(4);
        let collaborators = FakeCollaborators::new(4 * PAGE_SIZE);
        alloc.allocate_frames(4, &collaborators).unwrap();
        let err = alloc.allocate_frames(1, &collaborators).unwrap_err();
        assert!(matches!(err, KernelError::OutOfMemory { requested: 1, available: 0 }));
    }

    #[test]
    fn pre_bootstrap_allocation_falls_through_to_steal_memory() {
        let alloc = FrameAllocator::uninitialized();
        let collaborators = FakeCollaborators::new(8 * PAGE_SIZE);
        assert!(!alloc.is_bootstrapped());

        let frame = alloc.allocate_frames(2, &collaborators).unwrap();
        assert!(frame.is_page_aligned());
    }

    #[test]
    fn pre_bootstrap_free_is_a_no_op() {
        let alloc = FrameAllocator::uninitialized();
        // Must not panic: nothing to free into before the coremap exists.
        alloc.free_frames(PhysicalAddress::new(0));
        assert!(!alloc.is_bootstrapped());
    }

    #[test]
    fn allocated_addresses_are_page_aligned() {
        let alloc = new_allocator(8);
        let collaborators = FakeCollaborators::new(8 * PAGE_SIZE);
        let a = alloc.allocate_frames(1, &collaborators).unwrap();
        let b = alloc.allocate_frames(3, &collaborators).unwrap();
        assert!(a.is_page_aligned());
        assert!(b.is_page_aligned());
    }
}
