//! Address space: a process's two code/data regions plus its fixed stack.
//!
//! Page tables here are flat vectors of physical frames indexed by page
//! offset — not multi-level tables. That is deliberate: this nucleus does
//! not do demand paging, so every frame a region will ever own is
//! allocated up front by `prepare_load`.

use alloc::vec;
use alloc::vec::Vec;

use crate::collaborators::{self, Collaborators};
use crate::config::{PAGE_SIZE, USER_STACK_PAGES, USER_STACK_TOP};
use crate::error::{KernelError, KernelResult};
use crate::mm::frame::{FrameAllocator, PhysicalAddress};

/// Which of the three regions a faulting address fell into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    /// Region 1: populated first by `define_region`. Conventionally the
    /// code/text segment; demoted to read-only once `load_complete`.
    Text,
    /// Region 2: populated second by `define_region`.
    Data,
    Stack,
}

#[derive(Debug, Clone)]
pub struct Region {
    pub vbase: usize,
    pub npages: usize,
    pub pages: Vec<PhysicalAddress>,
    pub readable: bool,
    pub writable: bool,
    pub executable: bool,
}

impl Region {
    fn new(vbase: usize, npages: usize, r: bool, w: bool, x: bool) -> Self {
        Self {
            vbase,
            npages,
            pages: Vec::new(),
            readable: r,
            writable: w,
            executable: x,
        }
    }

    fn contains(&self, vaddr: usize) -> bool {
        vaddr >= self.vbase && vaddr < self.vbase + self.npages * PAGE_SIZE
    }

    fn page_index(&self, vaddr: usize) -> usize {
        (vaddr - self.vbase) / PAGE_SIZE
    }
}

fn round_down(addr: usize, align: usize) -> usize {
    addr & !(align - 1)
}

fn round_up(size: usize, align: usize) -> usize {
    (size + align - 1) & !(align - 1)
}

pub struct AddressSpace {
    pub region1: Option<Region>,
    pub region2: Option<Region>,
    pub stack: Vec<PhysicalAddress>,
    pub load_complete: bool,
}

impl AddressSpace {
    pub fn create() -> Self {
        Self {
            region1: None,
            region2: None,
            stack: Vec::new(),
            load_complete: false,
        }
    }

    /// Populate region 1 on the first call, region 2 on the second. A
    /// third call is a contract violation.
    pub fn define_region(
        &mut self,
        base: usize,
        size: usize,
        r: bool,
        w: bool,
        x: bool,
    ) -> KernelResult<()> {
        let vbase = round_down(base, PAGE_SIZE);
        let extended = size + (base - vbase);
        let npages = round_up(extended, PAGE_SIZE) / PAGE_SIZE;

        if self.region1.is_none() {
            self.region1 = Some(Region::new(vbase, npages, r, w, x));
            self.stack = vec![PhysicalAddress::new(0); USER_STACK_PAGES];
            Ok(())
        } else if self.region2.is_none() {
            self.region2 = Some(Region::new(vbase, npages, r, w, x));
            Ok(())
        } else {
            Err(KernelError::TooManyRegions)
        }
    }

    /// Allocate and zero-fill one frame per page in region 1, region 2,
    /// and the stack. Frames allocated before a failure remain recorded
    /// and are released by `destroy`.
    pub fn prepare_load(
        &mut self,
        allocator: &FrameAllocator,
        collaborators: &dyn Collaborators,
    ) -> KernelResult<()> {
        if let Some(region) = self.region1.as_mut() {
            fill_region(region, allocator, collaborators)?;
        }
        if let Some(region) = self.region2.as_mut() {
            fill_region(region, allocator, collaborators)?;
        }
        for slot in self.stack.iter_mut() {
            let frame = allocator.allocate_frames(1, collaborators)?;
            // SAFETY: the frame was just allocated exclusively for this slot.
            unsafe { collaborators::zero_fill(collaborators, frame, 1) };
            *slot = frame;
        }
        Ok(())
    }

    pub fn complete_load(&mut self) {
        self.load_complete = true;
    }

    pub fn define_stack(&self) -> usize {
        USER_STACK_TOP
    }

    /// Locate which region a faulting address belongs to, and the
    /// physical frame backing its page.
    pub fn translate(&self, vaddr: usize) -> KernelResult<(RegionKind, PhysicalAddress)> {
        if let Some(region) = &self.region1 {
            if region.contains(vaddr) {
                let frame = region.pages[region.page_index(vaddr)];
                debug_assert!(frame.is_page_aligned());
                return Ok((RegionKind::Text, frame));
            }
        }
        if let Some(region) = &self.region2 {
            if region.contains(vaddr) {
                let frame = region.pages[region.page_index(vaddr)];
                debug_assert!(frame.is_page_aligned());
                return Ok((RegionKind::Data, frame));
            }
        }
        let stack_base = USER_STACK_TOP - USER_STACK_PAGES * PAGE_SIZE;
        if vaddr >= stack_base && vaddr < USER_STACK_TOP {
            let index = (vaddr - stack_base) / PAGE_SIZE;
            let frame = self.stack[index];
            debug_assert!(frame.is_page_aligned());
            return Ok((RegionKind::Stack, frame));
        }
        Err(KernelError::FaultOutsideRegions { vaddr })
    }

    /// Replicate this address space into a freshly allocated one: same
    /// region geometry and permissions, fresh frames, byte-for-byte
    /// copies via the kernel's direct-mapped window.
    ///
    /// Copies exactly `PAGE_SIZE` bytes per page (and per stack slot) —
    /// not `npages * PAGE_SIZE` — which would read past a single page.
    pub fn copy(
        &self,
        allocator: &FrameAllocator,
        collaborators: &dyn Collaborators,
    ) -> KernelResult<AddressSpace> {
        let mut dest = AddressSpace::create();

        if let Some(src) = &self.region1 {
            dest.region1 = Some(Region::new(
                src.vbase,
                src.npages,
                src.readable,
                src.writable,
                src.executable,
            ));
            dest.stack = vec![PhysicalAddress::new(0); USER_STACK_PAGES];
        }
        if let Some(src) = &self.region2 {
            dest.region2 = Some(Region::new(
                src.vbase,
                src.npages,
                src.readable,
                src.writable,
                src.executable,
            ));
        }

        dest.prepare_load(allocator, collaborators)?;

        if let (Some(src), Some(dst)) = (&self.region1, &dest.region1) {
            copy_region(src, dst, collaborators);
        }
        if let (Some(src), Some(dst)) = (&self.region2, &dest.region2) {
            copy_region_pages(&src.pages, &dst.pages, collaborators);
        }
        copy_region_pages(&self.stack, &dest.stack, collaborators);

        dest.load_complete = self.load_complete;
        Ok(dest)
    }

    /// Release every frame this address space owns, in region1 → region2
    /// → stack order, then drop the now-empty vectors.
    pub fn destroy(mut self, allocator: &FrameAllocator) {
        if let Some(region) = self.region1.take() {
            for frame in region.pages {
                allocator.free_frames(frame);
            }
        }
        if let Some(region) = self.region2.take() {
            for frame in region.pages {
                allocator.free_frames(frame);
            }
        }
        for frame in self.stack.drain(..) {
            if frame.as_u64() != 0 {
                allocator.free_frames(frame);
            }
        }
    }
}

fn fill_region(
    region: &mut Region,
    allocator: &FrameAllocator,
    collaborators: &dyn Collaborators,
) -> KernelResult<()> {
    region.pages.reserve(region.npages);
    for _ in 0..region.npages {
        let frame = allocator.allocate_frames(1, collaborators)?;
        // SAFETY: the frame was just allocated exclusively for this page.
        unsafe { collaborators::zero_fill(collaborators, frame, 1) };
        region.pages.push(frame);
    }
    Ok(())
}

fn copy_region(src: &Region, dst: &Region, collaborators: &dyn Collaborators) {
    copy_region_pages(&src.pages, &dst.pages, collaborators);
}

fn copy_region_pages(src: &[PhysicalAddress], dst: &[PhysicalAddress], collaborators: &dyn Collaborators) {
    for (s, d) in src.iter().zip(dst.iter()) {
        let src_va = collaborators.physical_to_kernel_virtual(*s);
        let dst_va = collaborators.physical_to_kernel_virtual(*d);
        // SAFETY: both addresses name a whole, exclusively owned page in
        // the kernel's direct-mapped window; the ranges cannot overlap
        // since `dst` was freshly allocated.
        unsafe {
            core::ptr::copy_nonoverlapping(src_va as *const u8, dst_va as *mut u8, PAGE_SIZE);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::fake::FakeCollaborators;

    fn new_allocator() -> FrameAllocator {
        let a = FrameAllocator::uninitialized();
        a.bootstrap(PhysicalAddress::new(0), PhysicalAddress::new(64 * PAGE_SIZE as u64));
        a
    }

    #[test]
    fn define_region_rejects_a_third_call() {
        let mut asp = AddressSpace::create();
        asp.define_region(0x1000, PAGE_SIZE, true, true, true).unwrap();
        asp.define_region(0x2000, PAGE_SIZE, true, true, false).unwrap();
        let err = asp
            .define_region(0x3000, PAGE_SIZE, true, true, false)
            .unwrap_err();
        assert!(matches!(err, KernelError::TooManyRegions));
    }

    #[test]
    fn prepare_load_allocates_page_aligned_frames() {
        let allocator = new_allocator();
        let collaborators = FakeCollaborators::new(64 * PAGE_SIZE);
        let mut asp = AddressSpace::create();
        asp.define_region(0x1000, 2 * PAGE_SIZE, true, true, true).unwrap();
        asp.prepare_load(&allocator, &collaborators).unwrap();

        let region = asp.region1.as_ref().unwrap();
        assert_eq!(region.pages.len(), 2);
        for frame in &region.pages {
            assert!(frame.is_page_aligned());
        }
        assert_eq!(asp.stack.len(), USER_STACK_PAGES);
    }

    #[test]
    fn fork_copy_shares_no_frames_with_source() {
        let allocator = new_allocator();
        let collaborators = FakeCollaborators::new(64 * PAGE_SIZE);
        let mut parent = AddressSpace::create();
        parent.define_region(0x1000, PAGE_SIZE, true, true, true).unwrap();
        parent.define_region(0x2000, PAGE_SIZE, true, true, false).unwrap();
        parent.prepare_load(&allocator, &collaborators).unwrap();

        let child = parent.copy(&allocator, &collaborators).unwrap();

        let parent_frames: Vec<_> = parent.region1.as_ref().unwrap().pages.clone();
        let child_frames: Vec<_> = child.region1.as_ref().unwrap().pages.clone();
        for f in &child_frames {
            assert!(!parent_frames.contains(f));
        }
    }

    #[test]
    fn destroy_releases_every_recorded_frame() {
        let allocator = new_allocator();
        let collaborators = FakeCollaborators::new(64 * PAGE_SIZE);
        let mut asp = AddressSpace::create();
        asp.define_region(0x1000, PAGE_SIZE, true, true, true).unwrap();
        asp.prepare_load(&allocator, &collaborators).unwrap();

        asp.destroy(&allocator);

        // The whole pool should be free again, modulo the coremap's own
        // reserved pages accounted for at bootstrap time.
        let reclaimed = allocator
            .allocate_frames(1 + USER_STACK_PAGES, &collaborators)
            .unwrap();
        assert!(reclaimed.is_page_aligned());
    }
}
