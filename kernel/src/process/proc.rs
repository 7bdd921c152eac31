//! The process control block (§3 "Process").
//!
//! Ownership shape: a process owns its children (`Vec<Arc<Process>>`) and
//! its address space; it only *looks up* its parent, via a `Weak`
//! reference cleared by the parent's own destructor. That is the "weak
//! parent pointer, no cycle through owned references" choice from §9's
//! design notes — an explicit optional reference rather than a second
//! process-table lookup, since `Weak` already gives us exactly that
//! lookup without a separate registry.

use alloc::string::String;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;

use crate::collaborators::{ConsoleHandle, DirectoryHandle, ThreadHandle};
use crate::mm::AddressSpace;
use crate::sync::{CondVar, Mutex, SpinLock};

/// A process identifier. Thin newtype so a raw `u32` index into the pid
/// pool is never silently used where a `Region` page index or frame
/// number was meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub u32);

impl ProcessId {
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

/// Fields touched only while holding the per-process spinlock: short
/// pointer updates, never a blocking wait (§5's "must not block while
/// holding a spinlock").
pub struct ProcessState {
    pub address_space: Option<AddressSpace>,
    pub current_directory: DirectoryHandle,
    pub console: ConsoleHandle,
    pub threads: Vec<ThreadHandle>,
}

/// Fields touched only under `wait_lock`, and only ever written once
/// (§5: "`exit` establishes a happens-before edge to any `waitpid`").
struct WaitState {
    can_exit: bool,
    exit_code: u32,
}

pub struct Process {
    pub pid: ProcessId,
    pub name: String,
    state: SpinLock<ProcessState>,
    parent: SpinLock<Option<Weak<Process>>>,
    children: Mutex<Vec<Arc<Process>>>,
    wait: Mutex<WaitState>,
    wait_cv: CondVar,
}

impl Process {
    pub fn new(
        pid: ProcessId,
        name: String,
        current_directory: DirectoryHandle,
        console: ConsoleHandle,
    ) -> Arc<Self> {
        Arc::new(Self {
            pid,
            name,
            state: SpinLock::new(ProcessState {
                address_space: None,
                current_directory,
                console,
                threads: Vec::new(),
            }),
            parent: SpinLock::new(None),
            children: Mutex::new(Vec::new()),
            wait: Mutex::new(WaitState {
                can_exit: false,
                exit_code: 0,
            }),
            wait_cv: CondVar::new(),
        })
    }

    pub fn state(&self) -> &SpinLock<ProcessState> {
        &self.state
    }

    pub fn parent(&self) -> Option<Arc<Process>> {
        self.parent.lock().as_ref().and_then(Weak::upgrade)
    }

    pub fn set_parent(&self, parent: Option<Weak<Process>>) {
        *self.parent.lock() = parent;
    }

    pub fn children(&self) -> &Mutex<Vec<Arc<Process>>> {
        &self.children
    }

    /// Append `child` to this process's children sequence, under
    /// `children_lock`.
    pub fn add_child(&self, child: Arc<Process>) {
        self.children.lock().push(child);
    }

    /// Remove and return the child with the given pid, if present.
    pub fn take_child(&self, pid: ProcessId) -> Option<Arc<Process>> {
        let mut children = self.children.lock();
        let index = children.iter().position(|c| c.pid == pid)?;
        Some(children.remove(index))
    }

    /// Find a child with the given pid without removing it.
    pub fn find_child(&self, pid: ProcessId) -> Option<Arc<Process>> {
        self.children.lock().iter().find(|c| c.pid == pid).cloned()
    }

    /// §4.4's `exit`: mark the process exitable with the given encoded
    /// status and wake every `waitpid` waiter. Idempotent at the type
    /// level — calling twice is a caller bug, not modeled as an error,
    /// since user threads call `exit` at most once per process in this
    /// nucleus's model.
    pub fn mark_exited(&self, encoded_status: u32) {
        let mut wait = self.wait.lock();
        wait.exit_code = encoded_status;
        wait.can_exit = true;
        drop(wait);
        self.wait_cv.notify_all();
    }

    pub fn can_exit(&self) -> bool {
        self.wait.lock().can_exit
    }

    /// Block until `mark_exited` has run, then return the encoded status.
    pub fn wait_for_exit(&self) -> u32 {
        let mut wait = self.wait.lock();
        while !wait.can_exit {
            wait = self.wait_cv.wait(wait, &self.wait);
        }
        wait.exit_code
    }
}
