//! Memory management: coremap/frame allocator, address spaces, and the VM
//! fault handler that ties them to the software-managed TLB.

pub mod addrspace;
pub mod fault;
pub mod frame;

pub use addrspace::{AddressSpace, Region, RegionKind};
pub use fault::{FaultKind, FaultOutcome, dispatch_fault, handle_fault};
pub use frame::{FrameAllocator, PhysicalAddress};
