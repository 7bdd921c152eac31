//! Process lifecycle: `fork`, `exit`, `waitpid`, `getpid`, `execv` (§4.4).
//!
//! "Current process" is not modeled as hidden thread-local state the way
//! `curproc` is in the original: every entry point here takes an
//! `&Arc<Process>` explicitly. Thread-local lookup of "which process is
//! this trap from" is trap-dispatch-glue territory (out of scope, §1);
//! callers — the syscall-dispatch layer, or a test harness standing in
//! for it — already have to hold that `Arc` to know who is calling in
//! the first place.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::collaborators::TrapFrame;
use crate::config::{PAGE_SIZE, PATH_MAX, PID_MAX, PID_MIN};
use crate::context::Kernel;
use crate::error::{KernelError, KernelResult};
use crate::mm::addrspace::AddressSpace;
use crate::process::proc::{Process, ProcessId};
use crate::process::wait_status;

/// `getpid`: trivial, but kept as a function (rather than inlined at
/// every call site) so the syscall-dispatch layer has one name to call.
pub fn getpid(current: &Arc<Process>) -> ProcessId {
    current.pid
}

/// `fork`: clone the calling process's address space and spawn a thread
/// to run the copy starting from a cloned trap frame. Returns the
/// child's pid to the parent; the child itself returns through the
/// trap-dispatch glue's "enter forked process" routine, not through this
/// function.
pub fn fork(kernel: &Kernel, current: &Arc<Process>, trap_frame: &TrapFrame) -> KernelResult<ProcessId> {
    let child_pid = kernel.pid_pool.assign()?;

    let result = (|| -> KernelResult<Arc<Process>> {
        let child_as = {
            let guard = current.state().lock();
            let parent_as = guard
                .address_space
                .as_ref()
                .expect("fork: current process must have an address space");
            parent_as.copy(&kernel.frame_allocator, kernel.collaborators.as_ref())?
        };

        let directory = {
            let guard = current.state().lock();
            kernel.collaborators.reference_directory(guard.current_directory)
        };
        let console = kernel.collaborators.open_console();
        let child = Process::new(ProcessId(child_pid), current.name.clone(), directory, console);
        child.state().lock().address_space = Some(child_as);

        child.set_parent(Some(Arc::downgrade(current)));
        current.add_child(Arc::clone(&child));
        kernel.census.increment();

        let thread = kernel.collaborators.spawn_forked_thread(child_pid, trap_frame.clone());
        child.state().lock().threads.push(thread);

        Ok(child)
    })();

    match result {
        Ok(child) => {
            log::debug!("fork: pid {} -> child pid {}", current.pid.as_u32(), child.pid.as_u32());
            Ok(child.pid)
        }
        Err(err) => {
            // Unwind in reverse: nothing beyond the pid was committed on
            // any of these error paths since each step above is the last
            // fallible one before the next irreversible action.
            kernel.pid_pool.release(child_pid);
            Err(err)
        }
    }
}

/// `exit`: record the exit status, tear down the address space, and run
/// `proc_destroy`. Mirrors the original's ordering: the wait-status
/// update and broadcast happen first (under `wait_lock`), then address
/// space teardown happens outside any lock.
pub fn exit(kernel: &Kernel, current: Arc<Process>, code: i32) {
    current.mark_exited(wait_status::encode_exited(code as u8));

    let address_space = {
        let mut state = current.state().lock();
        state.threads.clear();
        state.address_space.take()
    };
    if let Some(address_space) = address_space {
        crate::mm::fault::flush(kernel.collaborators.as_ref());
        address_space.destroy(&kernel.frame_allocator);
    }

    log::info!("process {} exited with code {}", current.pid.as_u32(), code);
    proc_destroy(kernel, current);
}

/// Kill the current process for a `READONLY` VM fault: same shape as
/// `exit`, but with a signaled status rather than a normal exit code, and
/// without walking back through a syscall return path (§4.2/§7: "kills
/// the user process but does not panic the kernel").
pub fn kill_for_readonly_fault(kernel: &Kernel, current: Arc<Process>) {
    const SIGSEGV_LIKE: u8 = 11;
    current.mark_exited(wait_status::encode_signaled(SIGSEGV_LIKE));
    log::warn!("process {} killed: write to read-only text", current.pid.as_u32());

    let address_space = {
        let mut state = current.state().lock();
        state.threads.clear();
        state.address_space.take()
    };
    if let Some(address_space) = address_space {
        crate::mm::fault::flush(kernel.collaborators.as_ref());
        address_space.destroy(&kernel.frame_allocator);
    }
    proc_destroy(kernel, current);
}

/// `waitpid`: block until the named child exits, then reap it — detach
/// it from the children list and complete its destruction, now that it
/// has neither a parent nor outstanding work. The reference
/// implementation never explicitly reaps (see DESIGN.md); this
/// implementation does, to avoid an unbounded leak of already-exited,
/// already-waited children whose parent never itself exits.
pub fn waitpid(kernel: &Kernel, current: &Arc<Process>, pid: i32, options: i32) -> KernelResult<(ProcessId, u32)> {
    if options != 0 {
        return Err(KernelError::InvalidWaitOptions { options });
    }
    if pid < PID_MIN as i32 || pid > PID_MAX as i32 {
        return Err(KernelError::PidOutOfRange { pid });
    }
    let target = ProcessId(pid as u32);
    let child = current
        .find_child(target)
        .ok_or(KernelError::NoSuchChild { pid: target.as_u32() })?;

    let status = child.wait_for_exit();

    current.take_child(target);
    child.set_parent(None);
    destroy_rootless(kernel, child);

    Ok((target, status))
}

/// Everything `execv` hands back to the trap-dispatch glue to enter user
/// mode with. `argv_user_ptr` and `stack_pointer` are the same address:
/// by the time argument marshaling finishes, the adjusted stack pointer
/// *is* the user pointer to the freshly written `argv` array (§6).
#[derive(Debug, Clone, Copy)]
pub struct ExecImage {
    pub entry_point: usize,
    pub argc: i32,
    pub argv_user_ptr: usize,
    pub stack_pointer: usize,
}

/// `execv`: load a new program into a fresh address space, marshal
/// `argv` onto its stack, and report what the trap-dispatch glue needs
/// to warp into user mode. `path`/`argv` are already kernel-owned
/// strings here — the `copyinstr`/`copyin` step that produces them from
/// user pointers is folded into the syscall-dispatch layer above this
/// function, since this crate has no model of a raw user pointer type.
pub fn execv(kernel: &Kernel, current: &Arc<Process>, path: &str, argv: &[String]) -> KernelResult<ExecImage> {
    if path.len() + 1 > PATH_MAX {
        return Err(KernelError::StringTooLong { max: PATH_MAX });
    }
    for arg in argv {
        if arg.len() + 1 > PATH_MAX {
            return Err(KernelError::StringTooLong { max: PATH_MAX });
        }
    }

    let elf = kernel.collaborators.load_elf(path)?;

    let old_address_space = {
        let mut state = current.state().lock();
        let old = state.address_space.take();
        state.address_space = Some(AddressSpace::create());
        old
    };
    crate::mm::fault::flush(kernel.collaborators.as_ref());

    let build = (|| -> KernelResult<()> {
        let mut state = current.state().lock();
        let address_space = state.address_space.as_mut().expect("just installed above");
        let text = &elf.segments[0];
        let data = &elf.segments[1];
        address_space.define_region(
            text.vbase,
            text.npages * PAGE_SIZE,
            text.readable,
            text.writable,
            text.executable,
        )?;
        address_space.define_region(
            data.vbase,
            data.npages * PAGE_SIZE,
            data.readable,
            data.writable,
            data.executable,
        )?;
        address_space.prepare_load(&kernel.frame_allocator, kernel.collaborators.as_ref())?;
        Ok(())
    })();
    build?;

    {
        let state = current.state().lock();
        let address_space = state.address_space.as_ref().unwrap();
        copy_segment_bytes(address_space, 0, &elf.segments[0].data, kernel.collaborators.as_ref());
        copy_segment_bytes(address_space, 1, &elf.segments[1].data, kernel.collaborators.as_ref());
    }

    let stack_top = {
        let mut state = current.state().lock();
        let address_space = state.address_space.as_mut().unwrap();
        address_space.complete_load();
        address_space.define_stack()
    };
    crate::mm::fault::flush(kernel.collaborators.as_ref());

    let (argc, sp) = {
        let state = current.state().lock();
        let address_space = state.address_space.as_ref().unwrap();
        write_argv(address_space, argv, stack_top, kernel.collaborators.as_ref())?
    };

    if let Some(old) = old_address_space {
        old.destroy(&kernel.frame_allocator);
    }

    log::info!("execv: pid {} -> {:?}", current.pid.as_u32(), path);
    Ok(ExecImage {
        entry_point: elf.entry_point,
        argc,
        argv_user_ptr: sp,
        stack_pointer: sp,
    })
}

fn copy_segment_bytes(
    address_space: &AddressSpace,
    region_index: usize,
    data: &[u8],
    collaborators: &dyn crate::collaborators::Collaborators,
) {
    let region = if region_index == 0 {
        address_space.region1.as_ref()
    } else {
        address_space.region2.as_ref()
    }
    .expect("execv: region must be defined before copying segment bytes");

    for (page_index, frame) in region.pages.iter().enumerate() {
        let start = page_index * PAGE_SIZE;
        if start >= data.len() {
            break;
        }
        let end = core::cmp::min(start + PAGE_SIZE, data.len());
        let kvaddr = collaborators.physical_to_kernel_virtual(*frame);
        // SAFETY: `frame` was just allocated exclusively for this page by
        // `prepare_load` and zero-filled; writing the segment's initial
        // contents into it before any user code runs is exactly what
        // loading an ELF segment means.
        unsafe {
            core::ptr::copy_nonoverlapping(data[start..end].as_ptr(), kvaddr as *mut u8, end - start);
        }
    }
}

fn round_up4(n: usize) -> usize {
    (n + 3) & !3
}

/// Write each argument string top-down (4-byte aligned), then the
/// null-terminated pointer array beneath them (also 4-byte aligned),
/// exactly mirroring the source's two-pass stack layout loop. Returns
/// `(argc, final stack pointer)` — the final pointer is both the new
/// user stack pointer and the user-space address of `argv[0]`.
fn write_argv(
    address_space: &AddressSpace,
    argv: &[String],
    stack_top: usize,
    collaborators: &dyn crate::collaborators::Collaborators,
) -> KernelResult<(i32, usize)> {
    let n = argv.len();
    let mut sp = stack_top as u32;
    let mut arg_addrs = alloc::vec![0u32; n];

    for i in (0..n).rev() {
        let mut bytes: Vec<u8> = argv[i].as_bytes().to_vec();
        bytes.push(0);
        let aligned = round_up4(bytes.len()) as u32;
        sp -= aligned;
        write_user_bytes(address_space, collaborators, sp as usize, &bytes)?;
        arg_addrs[i] = sp;
    }

    for i in (0..=n).rev() {
        sp -= 4;
        let value: u32 = if i == n { 0 } else { arg_addrs[i] };
        write_user_bytes(address_space, collaborators, sp as usize, &value.to_ne_bytes())?;
    }

    Ok((n as i32, sp as usize))
}

/// Write `bytes` into user memory starting at `vaddr`, translating one
/// page at a time through the address space's page tables.
fn write_user_bytes(
    address_space: &AddressSpace,
    collaborators: &dyn crate::collaborators::Collaborators,
    vaddr: usize,
    bytes: &[u8],
) -> KernelResult<()> {
    let mut remaining = bytes;
    let mut addr = vaddr;
    while !remaining.is_empty() {
        let page_base = addr & !(PAGE_SIZE - 1);
        let offset = addr - page_base;
        let (_, frame) = address_space.translate(page_base)?;
        let chunk_len = core::cmp::min(remaining.len(), PAGE_SIZE - offset);
        let kvaddr = collaborators.physical_to_kernel_virtual(frame) + offset;
        // SAFETY: `frame` belongs exclusively to this address space's
        // stack region; `chunk_len` never crosses the frame's end.
        unsafe {
            core::ptr::copy_nonoverlapping(remaining.as_ptr(), kvaddr as *mut u8, chunk_len);
        }
        remaining = &remaining[chunk_len..];
        addr += chunk_len;
    }
    Ok(())
}

/// `proc_destroy` (§4.4). A process with a live parent is left alone —
/// the parent will reap it via `waitpid` or orphan it when the parent
/// itself exits. A parentless process walks its own children, finishing
/// off any that can already exit and orphaning (not destroying) the
/// rest, then releases its own resources.
fn proc_destroy(kernel: &Kernel, process: Arc<Process>) {
    if process.parent().is_some() {
        return;
    }
    destroy_rootless(kernel, process);
}

fn destroy_rootless(kernel: &Kernel, process: Arc<Process>) {
    let children: Vec<Arc<Process>> = process.children().lock().drain(..).collect();
    for child in children {
        child.set_parent(None);
        if child.can_exit() {
            destroy_rootless(kernel, child);
        }
        // Else: left alive as a root. Whatever still holds an `Arc` to
        // it (its own thread of execution) keeps it alive until it
        // exits on its own.
    }

    {
        let mut state = process.state().lock();
        if let Some(address_space) = state.address_space.take() {
            address_space.destroy(&kernel.frame_allocator);
        }
        state.threads.clear();
    }
    kernel.pid_pool.release(process.pid.as_u32());
    kernel.census.decrement();
    log::debug!("process {} destroyed", process.pid.as_u32());
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::collaborators::fake::FakeCollaborators;
    use crate::collaborators::{ConsoleHandle, DirectoryHandle, ElfImage, ElfSegment};
    use crate::mm::frame::PhysicalAddress;

    fn new_kernel() -> Kernel {
        let collaborators = Arc::new(FakeCollaborators::new(256 * PAGE_SIZE));
        Kernel::bootstrap(
            collaborators,
            PhysicalAddress::new(0),
            PhysicalAddress::new(256 * PAGE_SIZE as u64),
        )
    }

    /// Same as `new_kernel`, but also hands back the concrete fake so a
    /// test can script `load_elf` via `install_program`.
    fn new_kernel_with_fake() -> (Kernel, Arc<FakeCollaborators>) {
        let fake = Arc::new(FakeCollaborators::new(256 * PAGE_SIZE));
        let collaborators: Arc<dyn crate::collaborators::Collaborators> = fake.clone();
        let kernel = Kernel::bootstrap(
            collaborators,
            PhysicalAddress::new(0),
            PhysicalAddress::new(256 * PAGE_SIZE as u64),
        );
        (kernel, fake)
    }

    fn new_root_process(kernel: &Kernel, pid: u32) -> Arc<Process> {
        let console = kernel.collaborators.open_console();
        let proc = Process::new(ProcessId(pid), String::from("root"), DirectoryHandle(1), console);
        proc.state().lock().address_space = Some({
            let mut asp = AddressSpace::create();
            asp.define_region(0x1000, PAGE_SIZE, true, true, true).unwrap();
            asp.define_region(0x2000, PAGE_SIZE, true, true, false).unwrap();
            asp.prepare_load(&kernel.frame_allocator, kernel.collaborators.as_ref())
                .unwrap();
            asp
        });
        kernel.census.increment();
        proc
    }

    #[test]
    fn fork_then_child_exit_is_observed_by_parent_waitpid() {
        let kernel = new_kernel();
        let parent = new_root_process(&kernel, PID_MIN);
        let trap_frame = TrapFrame(vec![0u8; 4]);

        let child_pid = fork(&kernel, &parent, &trap_frame).unwrap();
        let child = parent.find_child(child_pid).unwrap();

        exit(&kernel, Arc::clone(&child), 7);

        let (pid, status) = waitpid(&kernel, &parent, child_pid.as_u32() as i32, 0).unwrap();
        assert_eq!(pid, child_pid);
        assert!(wait_status::exited(status));
        assert_eq!(wait_status::exit_status(status), 7);
    }

    #[test]
    fn fork_copy_shares_no_frames() {
        let kernel = new_kernel();
        let parent = new_root_process(&kernel, PID_MIN);
        let trap_frame = TrapFrame(vec![0u8; 4]);

        let child_pid = fork(&kernel, &parent, &trap_frame).unwrap();
        let child = parent.find_child(child_pid).unwrap();

        let parent_frames: Vec<_> = parent.state().lock().address_space.as_ref().unwrap().region1.as_ref().unwrap().pages.clone();
        let child_frames: Vec<_> = child.state().lock().address_space.as_ref().unwrap().region1.as_ref().unwrap().pages.clone();
        for f in &child_frames {
            assert!(!parent_frames.contains(f));
        }
    }

    #[test]
    fn waitpid_rejects_nonzero_options() {
        let kernel = new_kernel();
        let parent = new_root_process(&kernel, PID_MIN);
        let err = waitpid(&kernel, &parent, PID_MIN as i32, 1).unwrap_err();
        assert!(matches!(err, KernelError::InvalidWaitOptions { options: 1 }));
    }

    #[test]
    fn waitpid_on_a_non_child_is_echild() {
        let kernel = new_kernel();
        let parent = new_root_process(&kernel, PID_MIN);
        let err = waitpid(&kernel, &parent, (PID_MIN + 1) as i32, 0).unwrap_err();
        assert!(matches!(err, KernelError::NoSuchChild { .. }));
    }

    #[test]
    fn parent_exit_before_child_leaves_child_alive_as_a_root() {
        let kernel = new_kernel();
        let parent = new_root_process(&kernel, PID_MIN);
        let trap_frame = TrapFrame(vec![0u8; 4]);

        let child_pid = fork(&kernel, &parent, &trap_frame).unwrap();
        let child = parent.find_child(child_pid).unwrap();

        exit(&kernel, parent, 0);
        assert!(child.parent().is_none());
        assert_eq!(kernel.census.count(), 1);

        exit(&kernel, child, 3);
        assert_eq!(kernel.census.count(), 0);
    }

    #[test]
    fn execv_places_argv_four_byte_aligned_on_the_stack() {
        let (kernel, fake) = new_kernel_with_fake();
        let process = new_root_process(&kernel, PID_MIN);

        let image = ElfImage {
            entry_point: 0x4000_0000,
            segments: [
                ElfSegment {
                    vbase: 0x1000,
                    npages: 1,
                    readable: true,
                    writable: true,
                    executable: true,
                    data: vec![0xAA; PAGE_SIZE],
                },
                ElfSegment {
                    vbase: 0x2000,
                    npages: 1,
                    readable: true,
                    writable: true,
                    executable: false,
                    data: vec![0xBB; PAGE_SIZE],
                },
            ],
        };
        fake.install_program("prog", image);

        let argv = vec![String::from("prog"), String::from("a"), String::from("bb")];
        let result = execv(&kernel, &process, "prog", &argv).unwrap();
        assert_eq!(result.argc, 3);
        assert_eq!(result.argv_user_ptr % 4, 0);
        assert_eq!(result.stack_pointer, result.argv_user_ptr);
    }
}
