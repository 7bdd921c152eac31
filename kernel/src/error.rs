//! Kernel error taxonomy.
//!
//! One struct-variant enum carries every fallible outcome described in the
//! nucleus's error-handling design: resource exhaustion, contract
//! violations, lookup failures, and access failures. Internal invariant
//! violations (page misalignment, destroying a process without holding its
//! lock) are not represented here — those are `panic!`/`debug_assert!`.

use core::fmt;

/// Traditional Unix errno values this kernel actually produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Errno {
    /// Out of memory.
    ENOMEM = 12,
    /// Invalid argument.
    EINVAL = 22,
    /// No child processes.
    ECHILD = 10,
    /// Bad address.
    EFAULT = 14,
    /// Resource temporarily unavailable.
    EAGAIN = 11,
    /// No such file or directory.
    ENOENT = 2,
}

/// Every fallible outcome the nucleus's kernel-internal APIs can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "kernel errors must be handled, not silently discarded"]
pub enum KernelError {
    /// The frame allocator (or a heap allocation backed by it) had no room.
    OutOfMemory { requested: usize, available: usize },
    /// A VM fault arrived with a fault kind this handler does not accept.
    InvalidFaultKind,
    /// No current process or address space was active at fault time.
    NoCurrentProcess,
    /// The faulting address fell outside every region of the address space.
    FaultOutsideRegions { vaddr: usize },
    /// `waitpid` was called with a nonzero `options` argument.
    InvalidWaitOptions { options: i32 },
    /// A pid argument fell outside `[PID_MIN, PID_MAX]`.
    PidOutOfRange { pid: i32 },
    /// `waitpid` was called with a pid that is not one of the caller's
    /// children.
    NoSuchChild { pid: u32 },
    /// A third `define_region` call was made on an address space that
    /// already has both of its regions configured.
    TooManyRegions,
    /// The identifier pool has been exhausted: no free list entry and the
    /// counter has reached `PID_MAX`.
    IdentifiersExhausted,
    /// A path or argv string from userland exceeded `PATH_MAX`.
    StringTooLong { max: usize },
    /// `execv`'s ELF-loader collaborator could not find or load the named
    /// program. Stands in for the VFS/ELF-loader error surface §1 keeps
    /// out of scope, folded into one variant at this crate's boundary.
    ProgramLoadFailed,
}

impl KernelError {
    /// Map to the errno this kernel would hand back across the syscall
    /// boundary. Some syscalls narrow this further (see `process::exit`'s
    /// documentation of `fork`'s error surface); this is the general
    /// mapping used when no narrower rule applies.
    pub const fn errno(&self) -> Errno {
        match self {
            Self::OutOfMemory { .. } => Errno::ENOMEM,
            Self::InvalidFaultKind
            | Self::InvalidWaitOptions { .. }
            | Self::PidOutOfRange { .. }
            | Self::TooManyRegions
            | Self::StringTooLong { .. } => Errno::EINVAL,
            Self::NoSuchChild { .. } => Errno::ECHILD,
            Self::NoCurrentProcess | Self::FaultOutsideRegions { .. } => Errno::EFAULT,
            Self::IdentifiersExhausted => Errno::EAGAIN,
            Self::ProgramLoadFailed => Errno::ENOENT,
        }
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory { requested, available } => write!(
                f,
                "out of memory: requested {requested} frame(s), {available} available"
            ),
            Self::InvalidFaultKind => write!(f, "invalid fault kind"),
            Self::NoCurrentProcess => write!(f, "no current process or address space"),
            Self::FaultOutsideRegions { vaddr } => {
                write!(f, "faulting address {vaddr:#x} outside all regions")
            }
            Self::InvalidWaitOptions { options } => {
                write!(f, "invalid waitpid options: {options}")
            }
            Self::PidOutOfRange { pid } => write!(f, "pid {pid} out of range"),
            Self::NoSuchChild { pid } => write!(f, "no child with pid {pid}"),
            Self::TooManyRegions => write!(f, "address space already has two regions defined"),
            Self::IdentifiersExhausted => write!(f, "process identifier pool exhausted"),
            Self::StringTooLong { max } => write!(f, "string exceeds maximum length {max}"),
            Self::ProgramLoadFailed => write!(f, "failed to load executable"),
        }
    }
}

/// Result type alias used throughout the kernel-internal API.
pub type KernelResult<T> = Result<T, KernelError>;
