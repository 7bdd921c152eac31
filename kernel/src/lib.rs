//! Nucleus kernel library: the process/VM/synchronization core of an
//! educational MIPS-like operating system.
//!
//! This crate deliberately knows nothing about a real boot loader, VFS, ELF
//! reader, device driver, or trap vector — those are modeled as the
//! [`collaborators::Collaborators`] trait, which lets every module here be
//! exercised from host `#[test]`s against [`collaborators::fake::FakeCollaborators`]
//! instead of real hardware. A real port wires a bare-metal implementation
//! of that trait in once, at the boundary `bin/main.rs` owns.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", feature(alloc_error_handler))]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(not(target_os = "none"))]
extern crate std;

// Bare metal has no OS underneath it to hand a heap to us, so this crate
// carries its own global allocator on that target. On the host target
// (where the overwhelming majority of this crate's tests run) the system
// allocator already backs `alloc`, so no separate heap setup is needed.
#[cfg(target_os = "none")]
use linked_list_allocator::LockedHeap;

#[cfg(target_os = "none")]
#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Hand a freshly `steal_memory`d region to the global allocator. Bare-metal
/// `main.rs` calls this once, before `Kernel::bootstrap`, using a region
/// carved out by the boot loader collaborator.
///
/// # Safety
/// `base` must name `size` bytes of memory nothing else references.
#[cfg(target_os = "none")]
pub unsafe fn init_heap(base: usize, size: usize) {
    // SAFETY: forwarded from this function's own contract.
    unsafe {
        ALLOCATOR.lock().init(base as *mut u8, size);
    }
}

pub mod collaborators;
pub mod config;
pub mod context;
pub mod error;
pub mod intersection;
pub mod logging;
pub mod mm;
pub mod process;
pub mod sync;

pub use context::Kernel;
pub use error::{KernelError, KernelResult};

#[cfg(all(target_os = "none", not(test)))]
#[alloc_error_handler]
fn alloc_error_handler(layout: core::alloc::Layout) -> ! {
    panic!("kernel heap allocation failed: {:?}", layout);
}

#[cfg(all(target_os = "none", not(test)))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    log::error!("kernel panic: {info}");
    loop {
        core::hint::spin_loop();
    }
}
