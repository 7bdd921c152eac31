//! Virtual memory fault handler (§4.2).
//!
//! Translates a faulting address against an address space and installs a
//! TLB entry. This module knows nothing about processes: a `READONLY`
//! fault is reported back as [`FaultOutcome::Kill`] and it is the caller's
//! job — the syscall-dispatch layer, which does know how to tear a
//! process down — to act on it. That split keeps `mm` free of a
//! dependency on `process`.

use crate::collaborators::{Collaborators, TlbEntry};
use crate::config::{NUM_TLB, PAGE_SIZE};
use crate::error::{KernelError, KernelResult};
use crate::mm::addrspace::{AddressSpace, RegionKind};

/// The three fault kinds the hardware can raise against user memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    ReadOnly,
    Read,
    Write,
}

impl FaultKind {
    /// Decode the raw fault-kind value the trap-dispatch glue hands us.
    /// Anything outside the three known kinds is a contract violation,
    /// not an internal bug, so it is surfaced as `EINVAL` rather than
    /// panicking.
    pub fn from_raw(raw: i32) -> KernelResult<Self> {
        match raw {
            0 => Ok(Self::ReadOnly),
            1 => Ok(Self::Read),
            2 => Ok(Self::Write),
            _ => Err(KernelError::InvalidFaultKind),
        }
    }
}

/// What the caller should do after `handle_fault` returns successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOutcome {
    /// A TLB entry was installed; the faulting instruction can be retried.
    Resolved,
    /// A `READONLY` fault arrived. No TLB entry is installed; the caller
    /// must terminate the current process. The kernel itself never panics
    /// for this case.
    Kill,
}

/// Handle one fault against `address_space` at `vaddr`, already rounded
/// down to a page boundary by the trap-dispatch glue.
///
/// `address_space` is `None` when no process (or no address space) is
/// current — an early-boot kernel fault (§4.2) — in which case this
/// returns `Err(KernelError::NoCurrentProcess)` rather than touching the
/// TLB. [`dispatch_fault`] is the trap-dispatch-facing wrapper that turns
/// that specific error into the panic §4.2 calls for.
///
/// Interrupt masking around the TLB scan/write (§5) is the acquiring
/// processor's job in the trap-dispatch glue; this function only performs
/// the scan-then-write-or-write-random sequence that must happen while
/// masked.
pub fn handle_fault(
    address_space: Option<&AddressSpace>,
    kind: FaultKind,
    vaddr: usize,
    collaborators: &dyn Collaborators,
) -> KernelResult<FaultOutcome> {
    let address_space = address_space.ok_or(KernelError::NoCurrentProcess)?;

    if kind == FaultKind::ReadOnly {
        return Ok(FaultOutcome::Kill);
    }

    let vaddr = vaddr & !(PAGE_SIZE - 1);
    let (region, frame) = address_space.translate(vaddr)?;
    debug_assert!(frame.is_page_aligned(), "fault handler must never see a misaligned frame");

    let writable = !(region == RegionKind::Text && address_space.load_complete);
    let entry = TlbEntry {
        virtual_page_number: vaddr / PAGE_SIZE,
        physical_frame: frame,
        valid: true,
        dirty: writable,
    };
    install_entry(collaborators, entry);

    Ok(FaultOutcome::Resolved)
}

/// Trap-dispatch-facing wrapper around [`handle_fault`]. Identical except
/// for one case: §4.2 says a fault with no current process or address
/// space is an early-boot kernel fault whose caller panics, rather than an
/// ordinary error a syscall return path could adapt into an errno. Every
/// other [`KernelError`] (`FaultOutsideRegions`, a bad `FaultKind`, ...)
/// still comes back as `Err` for the caller to handle normally.
pub fn dispatch_fault(
    address_space: Option<&AddressSpace>,
    kind: FaultKind,
    vaddr: usize,
    collaborators: &dyn Collaborators,
) -> KernelResult<FaultOutcome> {
    match handle_fault(address_space, kind, vaddr, collaborators) {
        Err(KernelError::NoCurrentProcess) => {
            panic!("VM fault with no current process or address space: bad address")
        }
        other => other,
    }
}

/// Scan for an invalid TLB slot and write there; if every slot is valid,
/// fall back to the hardware-assisted random replacement.
fn install_entry(collaborators: &dyn Collaborators, entry: TlbEntry) {
    for index in 0..NUM_TLB {
        if !collaborators.tlb_read(index).valid {
            collaborators.tlb_write(entry, index);
            return;
        }
    }
    collaborators.tlb_write_random(entry);
}

/// Invalidate every TLB slot. Called by `address_space_activate` (on
/// process switch) and by `complete_load` (§4.3/§4.4).
pub fn flush(collaborators: &dyn Collaborators) {
    let invalid = TlbEntry {
        virtual_page_number: 0,
        physical_frame: crate::mm::frame::PhysicalAddress::new(0),
        valid: false,
        dirty: false,
    };
    for index in 0..NUM_TLB {
        collaborators.tlb_write(invalid, index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::fake::FakeCollaborators;
    use crate::mm::frame::FrameAllocator;

    fn setup() -> (FrameAllocator, FakeCollaborators) {
        let allocator = FrameAllocator::uninitialized();
        allocator.bootstrap(
            crate::mm::frame::PhysicalAddress::new(0),
            crate::mm::frame::PhysicalAddress::new(64 * PAGE_SIZE as u64),
        );
        (allocator, FakeCollaborators::new(64 * PAGE_SIZE))
    }

    #[test]
    fn read_fault_installs_a_valid_entry() {
        let (allocator, collaborators) = setup();
        let mut asp = AddressSpace::create();
        asp.define_region(0x1000, PAGE_SIZE, true, true, true).unwrap();
        asp.prepare_load(&allocator, &collaborators).unwrap();

        let outcome = handle_fault(Some(&asp), FaultKind::Read, 0x1000, &collaborators).unwrap();
        assert_eq!(outcome, FaultOutcome::Resolved);

        let installed = collaborators.tlb_read(0);
        assert!(installed.valid);
        assert!(installed.dirty);
    }

    #[test]
    fn text_fault_after_load_complete_is_read_only() {
        let (allocator, collaborators) = setup();
        let mut asp = AddressSpace::create();
        asp.define_region(0x1000, PAGE_SIZE, true, true, true).unwrap();
        asp.define_region(0x2000, PAGE_SIZE, true, true, false).unwrap();
        asp.prepare_load(&allocator, &collaborators).unwrap();
        asp.complete_load();

        let text = handle_fault(Some(&asp), FaultKind::Read, 0x1000, &collaborators).unwrap();
        assert_eq!(text, FaultOutcome::Resolved);
        assert!(!collaborators.tlb_read(0).dirty);

        let data = handle_fault(Some(&asp), FaultKind::Write, 0x2000, &collaborators).unwrap();
        assert_eq!(data, FaultOutcome::Resolved);
        assert!(collaborators.tlb_read(1).dirty);
    }

    #[test]
    fn readonly_fault_kills_without_touching_the_tlb() {
        let (allocator, collaborators) = setup();
        let mut asp = AddressSpace::create();
        asp.define_region(0x1000, PAGE_SIZE, true, true, true).unwrap();
        asp.prepare_load(&allocator, &collaborators).unwrap();

        let outcome = handle_fault(Some(&asp), FaultKind::ReadOnly, 0x1000, &collaborators).unwrap();
        assert_eq!(outcome, FaultOutcome::Kill);
        assert!(!collaborators.tlb_read(0).valid);
    }

    #[test]
    fn fault_outside_every_region_is_efault() {
        let (allocator, collaborators) = setup();
        let mut asp = AddressSpace::create();
        asp.define_region(0x1000, PAGE_SIZE, true, true, true).unwrap();
        asp.prepare_load(&allocator, &collaborators).unwrap();

        let err = handle_fault(Some(&asp), FaultKind::Read, 0x9000_0000, &collaborators).unwrap_err();
        assert!(matches!(err, KernelError::FaultOutsideRegions { .. }));
    }

    #[test]
    fn unknown_raw_fault_kind_is_einval() {
        assert!(matches!(FaultKind::from_raw(7), Err(KernelError::InvalidFaultKind)));
    }

    #[test]
    fn no_current_address_space_is_no_current_process() {
        let (_allocator, collaborators) = setup();
        let err = handle_fault(None, FaultKind::Read, 0x1000, &collaborators).unwrap_err();
        assert!(matches!(err, KernelError::NoCurrentProcess));
    }

    #[test]
    #[should_panic(expected = "bad address")]
    fn dispatch_fault_panics_with_no_current_address_space() {
        let (_allocator, collaborators) = setup();
        let _ = dispatch_fault(None, FaultKind::Read, 0x1000, &collaborators);
    }

    #[test]
    fn dispatch_fault_still_reports_ordinary_errors() {
        let (allocator, collaborators) = setup();
        let mut asp = AddressSpace::create();
        asp.define_region(0x1000, PAGE_SIZE, true, true, true).unwrap();
        asp.prepare_load(&allocator, &collaborators).unwrap();

        let err = dispatch_fault(Some(&asp), FaultKind::Read, 0x9000_0000, &collaborators).unwrap_err();
        assert!(matches!(err, KernelError::FaultOutsideRegions { .. }));
    }
}
