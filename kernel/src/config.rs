//! Kernel-wide constants.
//!
//! Centralized so the rest of the crate never spells out a magic number for
//! page geometry, TLB size, the pid range, or buffer limits.

/// Size of one physical/virtual page, in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Number of hardware TLB slots.
pub const NUM_TLB: usize = 64;

/// Fixed size of the user stack region, in pages.
pub const USER_STACK_PAGES: usize = 12;

/// Top (exclusive, highest address) of the user stack region.
///
/// Matches the traditional MIPS/OS161 user address space layout: the stack
/// grows down from just below the kernel/user boundary.
pub const USER_STACK_TOP: usize = 0x8000_0000;

/// Base (inclusive, lowest address) of the user stack region.
pub const USER_STACK_BASE: usize = USER_STACK_TOP - USER_STACK_PAGES * PAGE_SIZE;

/// Lowest assignable process identifier.
pub const PID_MIN: u32 = 2;

/// Highest assignable process identifier.
pub const PID_MAX: u32 = 0xFFFF;

/// Maximum length, including the terminating nul, of a path or argv string
/// copied in from userland.
pub const PATH_MAX: usize = 1024;
