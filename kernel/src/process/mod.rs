//! Process model: identifiers, the process control block, the exit-status
//! wait-channel plumbing, the quiescence census, and the lifecycle
//! operations (`fork`/`exit`/`waitpid`/`getpid`/`execv`) built on top of
//! them (§3, §4.4).

pub mod census;
pub mod lifecycle;
pub mod pid_pool;
pub mod proc;
pub mod wait_status;

pub use lifecycle::{execv, exit, fork, getpid, kill_for_readonly_fault, waitpid, ExecImage};
pub use proc::{Process, ProcessId, ProcessState};
