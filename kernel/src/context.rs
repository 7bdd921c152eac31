//! Single kernel context (§9: "encapsulate as a single 'kernel context'
//! passed by reference; initialize in a single bootstrap routine with
//! clear ordering").
//!
//! Bundles every piece of otherwise-global mutable state this nucleus
//! needs — the coremap/frame allocator, the pid pool, the process
//! census, the intersection synchronizer, the kernel process, and the
//! collaborator boundary — behind one struct so call sites take `&Kernel`
//! instead of reaching for a handful of separate statics.

use alloc::string::String;
use alloc::sync::Arc;

use crate::collaborators::{Collaborators, ConsoleHandle, DirectoryHandle};
use crate::intersection::Intersection;
use crate::mm::frame::FrameAllocator;
use crate::process::census::ProcessCensus;
use crate::process::pid_pool::PidPool;
use crate::process::proc::{Process, ProcessId};

/// Everything `fork`/`exit`/`waitpid`/`execv` and the VM fault path share.
pub struct Kernel {
    pub frame_allocator: FrameAllocator,
    pub pid_pool: PidPool,
    pub census: ProcessCensus,
    pub intersection: Intersection,
    /// The kernel process: root of every process tree, never counted in
    /// `census`, never destroyed (§4.4 bootstrap note).
    pub kernel_process: Arc<Process>,
    pub collaborators: Arc<dyn Collaborators>,
}

impl Kernel {
    /// Bootstrap in the locking order §5 prescribes: identifier pool,
    /// then the coremap, then the kernel process and process table, then
    /// the quiescence signal pair, then the intersection synchronizer's
    /// condition variables. None of those steps can actually contend
    /// with each other this early (nothing else is running yet), but the
    /// ordering is kept explicit so it stays correct if that ever
    /// changes.
    pub fn bootstrap(
        collaborators: Arc<dyn Collaborators>,
        physical_lo: crate::mm::frame::PhysicalAddress,
        physical_hi: crate::mm::frame::PhysicalAddress,
    ) -> Self {
        let pid_pool = PidPool::new();

        let frame_allocator = FrameAllocator::uninitialized();
        frame_allocator.bootstrap(physical_lo, physical_hi);

        let console = collaborators.open_console();

        // The host target installs its own `log` backend per test (a fake
        // `BufferingLogger`, or none at all); only a real kernel image
        // commits to one console-backed logger for its whole lifetime.
        #[cfg(target_os = "none")]
        crate::logging::install_console_logger(
            alloc::sync::Arc::clone(&collaborators),
            console,
            log::LevelFilter::Debug,
        );

        let kernel_process = Process::new(
            ProcessId(0),
            String::from("kernel"),
            DirectoryHandle(0),
            console,
        );

        let census = ProcessCensus::new();
        let intersection = Intersection::new();

        log::info!("kernel context bootstrapped");

        Self {
            frame_allocator,
            pid_pool,
            census,
            intersection,
            kernel_process,
            collaborators,
        }
    }
}
