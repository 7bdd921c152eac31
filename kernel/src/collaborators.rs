//! Narrow interface onto everything this nucleus treats as an external
//! collaborator: the boot loader's early memory pool, the kernel's
//! direct-mapped physical-to-virtual window, the software TLB, the ELF
//! loader, and console open. None of these are implemented here — the
//! nucleus only ever calls through this trait, which lets every other
//! module in this crate be exercised from a host `#[test]` against
//! [`FakeCollaborators`] instead of real hardware.
//!
//! The trap frame the trap-dispatch glue hands us on entry, and expects
//! back on a forked child's first return to userland, is likewise opaque:
//! we only ever copy it, never interpret its bytes.

use crate::config::PAGE_SIZE;
use crate::error::{KernelError, KernelResult};
use crate::mm::frame::PhysicalAddress;

/// One hardware TLB entry: virtual page number plus the physical frame and
/// flag bits the MMU loads on a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlbEntry {
    pub virtual_page_number: usize,
    pub physical_frame: PhysicalAddress,
    pub valid: bool,
    pub dirty: bool,
}

/// Opaque copy of whatever the trap-dispatch glue considers a trap frame.
/// `fork` clones it onto the heap; nothing in this crate reads its fields.
#[derive(Debug, Clone)]
pub struct TrapFrame(pub alloc::vec::Vec<u8>);

/// One loadable segment of an ELF image: a code/data region plus its
/// initial file contents (zero-padded to a whole number of pages by the
/// loader collaborator).
#[derive(Debug, Clone)]
pub struct ElfSegment {
    pub vbase: usize,
    pub npages: usize,
    pub readable: bool,
    pub writable: bool,
    pub executable: bool,
    pub data: alloc::vec::Vec<u8>,
}

/// What the ELF loader collaborator hands back: an entry point plus
/// exactly two loadable segments (region 1 = text, region 2 = data), per
/// §4.3's "first call populates region 1; second call populates region 2".
#[derive(Debug, Clone)]
pub struct ElfImage {
    pub entry_point: usize,
    pub segments: [ElfSegment; 2],
}

/// A console handle. Opaque beyond being cloneable/droppable in the right
/// order during process teardown.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleHandle(pub u64);

/// Everything the nucleus needs from the outside world.
pub trait Collaborators: Send + Sync {
    /// Carve `npages` contiguous pages from the unstructured early-boot
    /// pool. Used only before the coremap has been bootstrapped.
    fn steal_memory(&self, npages: usize) -> Option<PhysicalAddress>;

    /// The kernel's direct-mapped virtual address for a physical address,
    /// used to read/write/zero frames without a page-table walk.
    fn physical_to_kernel_virtual(&self, paddr: PhysicalAddress) -> usize;

    fn tlb_read(&self, index: usize) -> TlbEntry;
    fn tlb_write(&self, entry: TlbEntry, index: usize);
    fn tlb_write_random(&self, entry: TlbEntry);

    /// Open a fresh console handle for a newly created process.
    fn open_console(&self) -> ConsoleHandle;

    /// Write one already-formatted line to a console handle. Used by the
    /// logging facade (`crate::logging`); the nucleus itself never
    /// constructs console content beyond log lines.
    fn console_write(&self, console: ConsoleHandle, line: &str);

    /// Load an executable by path. VFS/ELF errors are folded into
    /// `KernelError` at this boundary; this crate does not model them
    /// individually since the VFS is out of scope.
    fn load_elf(&self, path: &str) -> KernelResult<ElfImage>;

    /// Increment the current directory's VFS refcount and hand back a
    /// handle a child process can inherit. The VFS itself owns the
    /// refcounting; this crate only ever clones and drops the handle.
    fn reference_directory(&self, dir: DirectoryHandle) -> DirectoryHandle;

    /// Spawn the kernel thread that runs a forked child's first
    /// instruction: the trap-dispatch glue's "enter forked process"
    /// routine, reading the trap frame `fork` cloned onto the heap. This
    /// is as far into thread creation as the nucleus goes — how the
    /// thread is actually scheduled onto a processor is trap-dispatch and
    /// scheduler territory, both out of scope (§1).
    fn spawn_forked_thread(&self, child_pid: u32, trap_frame: TrapFrame) -> ThreadHandle;
}

/// A VFS current-directory handle. Opaque: the VFS collaborator owns the
/// vnode and its refcount, this crate only clones/drops the handle at the
/// right points in `fork`/teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryHandle(pub u64);

/// Handle to a kernel thread spawned by [`Collaborators::spawn_forked_thread`].
/// Opaque beyond being storable in a process's thread list and droppable
/// during teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadHandle(pub u64);

/// Zero-fill `npages` pages starting at `paddr`'s kernel virtual mapping.
/// A small helper used by address-space setup; not part of the trait since
/// it is purely a convenience wrapper over `physical_to_kernel_virtual`.
///
/// # Safety
/// The caller must guarantee `paddr` names `npages` pages this process
/// exclusively owns — the nucleus upholds this by only calling it
/// immediately after a fresh `allocate_frames`.
pub unsafe fn zero_fill(collaborators: &dyn Collaborators, paddr: PhysicalAddress, npages: usize) {
    let kvaddr = collaborators.physical_to_kernel_virtual(paddr);
    // SAFETY: caller guarantees exclusive ownership of `npages` pages
    // starting at `paddr`'s kernel mapping.
    unsafe {
        core::ptr::write_bytes(kvaddr as *mut u8, 0, npages * PAGE_SIZE);
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod fake {
    //! An in-memory stand-in used by host `#[test]`s. Backs physical
    //! memory with a plain `Vec<u8>` and implements the direct-mapped
    //! window as an identity offset into that buffer.

    use alloc::collections::BTreeMap;
    use alloc::string::String;
    use alloc::vec::Vec;

    use super::*;
    use crate::sync::SpinLock;

    pub struct FakeCollaborators {
        memory: SpinLock<Vec<u8>>,
        steal_cursor: SpinLock<usize>,
        tlb: SpinLock<[TlbEntry; crate::config::NUM_TLB]>,
        programs: SpinLock<BTreeMap<String, ElfImage>>,
        next_thread: core::sync::atomic::AtomicU64,
        next_dir: core::sync::atomic::AtomicU64,
        spawned: SpinLock<Vec<(u64, TrapFrame)>>,
    }

    impl FakeCollaborators {
        pub fn new(physical_bytes: usize) -> Self {
            Self {
                memory: SpinLock::new(alloc::vec![0u8; physical_bytes]),
                steal_cursor: SpinLock::new(0),
                tlb: SpinLock::new(
                    [TlbEntry {
                        virtual_page_number: 0,
                        physical_frame: PhysicalAddress::new(0),
                        valid: false,
                        dirty: false,
                    }; crate::config::NUM_TLB],
                ),
                programs: SpinLock::new(BTreeMap::new()),
                next_thread: core::sync::atomic::AtomicU64::new(1),
                next_dir: core::sync::atomic::AtomicU64::new(1),
                spawned: SpinLock::new(Vec::new()),
            }
        }

        /// Trap frames handed to `spawn_forked_thread` so far, in spawn
        /// order. Tests use this to confirm `fork` cloned the right frame
        /// without needing a real scheduler to run it.
        pub fn spawned_trap_frames(&self) -> Vec<(u64, TrapFrame)> {
            self.spawned.lock().clone()
        }

        /// Register a program the fake loader can hand back from
        /// `load_elf`. Tests use this to script `execv` scenarios.
        pub fn install_program(&self, path: &str, image: ElfImage) {
            self.programs.lock().insert(String::from(path), image);
        }

    }

    impl Collaborators for FakeCollaborators {
        fn steal_memory(&self, npages: usize) -> Option<PhysicalAddress> {
            let mut cursor = self.steal_cursor.lock();
            let needed = npages * PAGE_SIZE;
            let mem_len = self.memory.lock().len();
            if *cursor + needed > mem_len {
                return None;
            }
            let base = *cursor;
            *cursor += needed;
            Some(PhysicalAddress::new(base as u64))
        }

        /// The backing store is a fixed-size `Vec<u8>` allocated once in
        /// `new` and never resized, so its buffer never moves: handing out
        /// a raw pointer into it under the lock and using it after the
        /// guard drops is sound as long as that invariant holds.
        fn physical_to_kernel_virtual(&self, paddr: PhysicalAddress) -> usize {
            let mut memory = self.memory.lock();
            let offset = paddr.as_u64() as usize;
            assert!(offset < memory.len(), "physical address out of the fake's backing store");
            // SAFETY: `memory` is allocated once at its final size in
            // `new` and never reallocated, so this pointer stays valid
            // for the `FakeCollaborators`' whole lifetime.
            unsafe { memory.as_mut_ptr().add(offset) as usize }
        }

        fn tlb_read(&self, index: usize) -> TlbEntry {
            self.tlb.lock()[index]
        }

        fn tlb_write(&self, entry: TlbEntry, index: usize) {
            self.tlb.lock()[index] = entry;
        }

        fn tlb_write_random(&self, entry: TlbEntry) {
            // Deterministic for tests: always slot 0's neighbor-free scan
            // already handles "find an invalid slot first"; random fallback
            // just takes slot 0.
            self.tlb.lock()[0] = entry;
        }

        fn open_console(&self) -> ConsoleHandle {
            ConsoleHandle(1)
        }

        fn console_write(&self, _console: ConsoleHandle, _line: &str) {
            // The fake has no real console to write to; tests that care
            // about log output install a `logging::fake::BufferingLogger`
            // instead of asserting on console bytes.
        }

        fn load_elf(&self, path: &str) -> KernelResult<ElfImage> {
            self.programs
                .lock()
                .get(path)
                .cloned()
                .ok_or(KernelError::ProgramLoadFailed)
        }

        fn reference_directory(&self, dir: DirectoryHandle) -> DirectoryHandle {
            if dir.0 == 0 {
                DirectoryHandle(self.next_dir.fetch_add(1, core::sync::atomic::Ordering::Relaxed))
            } else {
                dir
            }
        }

        fn spawn_forked_thread(&self, child_pid: u32, trap_frame: TrapFrame) -> ThreadHandle {
            let handle = self.next_thread.fetch_add(1, core::sync::atomic::Ordering::Relaxed);
            self.spawned.lock().push((child_pid as u64, trap_frame));
            ThreadHandle(handle)
        }
    }
}
