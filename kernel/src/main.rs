//! Thin binary entry point.
//!
//! The nucleus itself (`nucleus_kernel`) has zero knowledge of a real boot
//! loader, MIPS trap vector, or TLB opcodes — those collaborators belong to
//! the surrounding system this crate is meant to be linked into (§1). This
//! binary is therefore not a bootable kernel image; on the host target it
//! is a small smoke-test harness that bootstraps [`Kernel`] against the
//! in-memory [`FakeCollaborators`] and runs one fork/exit/waitpid cycle, so
//! the crate has something runnable beyond its test suite. On a bare-metal
//! target it is the integration seam: a real port provides its own
//! `Collaborators` implementation and boot sequence, then calls
//! [`Kernel::bootstrap`] the same way this demo does.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
#[no_mangle]
pub extern "C" fn _start() -> ! {
    // A real port replaces this with: carve the coremap's physical range
    // from the boot loader, construct its own `Collaborators` impl, call
    // `nucleus_kernel::init_heap`, then `Kernel::bootstrap`. There is
    // nothing this crate can do on its own here without those collaborators.
    loop {
        core::hint::spin_loop();
    }
}

#[cfg(all(not(target_os = "none"), not(feature = "testing")))]
fn main() {
    println!("nucleus-kernel: build with `--features testing` to run the fork/exit/waitpid demo.");
}

#[cfg(all(not(target_os = "none"), feature = "testing"))]
fn main() {
    use std::sync::Arc;

    use nucleus_kernel::collaborators::fake::FakeCollaborators;
    use nucleus_kernel::collaborators::TrapFrame;
    use nucleus_kernel::config::PAGE_SIZE;
    use nucleus_kernel::mm::frame::PhysicalAddress;
    use nucleus_kernel::mm::AddressSpace;
    use nucleus_kernel::process::{self, Process, ProcessId};
    use nucleus_kernel::Kernel;

    let collaborators: Arc<dyn nucleus_kernel::collaborators::Collaborators> =
        Arc::new(FakeCollaborators::new(4096 * PAGE_SIZE));
    let kernel = Kernel::bootstrap(
        collaborators,
        PhysicalAddress::new(0),
        PhysicalAddress::new((4096 * PAGE_SIZE) as u64),
    );

    let init_console = kernel.collaborators.open_console();
    let init = Process::new(
        ProcessId(2),
        String::from("init"),
        nucleus_kernel::collaborators::DirectoryHandle(1),
        init_console,
    );
    {
        let mut asp = AddressSpace::create();
        asp.define_region(0x1000, PAGE_SIZE, true, true, true).unwrap();
        asp.define_region(0x2000, PAGE_SIZE, true, true, false).unwrap();
        asp.prepare_load(&kernel.frame_allocator, kernel.collaborators.as_ref())
            .unwrap();
        init.state().lock().address_space = Some(asp);
    }
    kernel.census.increment();

    let child_pid = process::fork(&kernel, &init, &TrapFrame(vec![0u8; 4])).expect("fork");
    let child = init.find_child(child_pid).expect("child registered");
    process::exit(&kernel, child, 7);

    let (pid, status) = process::waitpid(&kernel, &init, child_pid.as_u32() as i32, 0).expect("waitpid");
    println!(
        "nucleus-kernel demo: pid {} exited with status {:#x}",
        pid.as_u32(),
        status
    );
}
