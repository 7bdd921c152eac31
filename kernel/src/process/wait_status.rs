//! Exit-status encoding (§6), matching the classic `WEXITSTATUS`/
//! `WIFEXITED`/`WTERMSIG` family: low byte carries the terminating
//! signal (zero for a normal exit), the next byte carries the exit code.

const SIGNAL_MASK: u32 = 0xff;
const EXIT_CODE_SHIFT: u32 = 8;

/// Encode a normal `exit(code)` as a wait status: signal byte zero, exit
/// code in the next byte.
pub const fn encode_exited(code: u8) -> u32 {
    (code as u32) << EXIT_CODE_SHIFT
}

/// Encode termination by (simulated) signal `sig`, as used when the
/// kernel kills a process for a `READONLY` VM fault rather than letting
/// it return normally.
pub const fn encode_signaled(sig: u8) -> u32 {
    debug_assert!(sig != 0, "signal 0 would be indistinguishable from a normal exit");
    sig as u32
}

/// True if `status` encodes a normal exit.
pub const fn exited(status: u32) -> bool {
    status & SIGNAL_MASK == 0
}

/// The exit code of a status for which `exited` is true.
pub const fn exit_status(status: u32) -> u8 {
    (status >> EXIT_CODE_SHIFT) as u8
}

/// True if `status` encodes termination by signal.
pub const fn signaled(status: u32) -> bool {
    !exited(status)
}

/// The terminating signal of a status for which `signaled` is true.
pub const fn term_signal(status: u32) -> u8 {
    (status & SIGNAL_MASK) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_normal_exit() {
        let status = encode_exited(7);
        assert!(exited(status));
        assert!(!signaled(status));
        assert_eq!(exit_status(status), 7);
    }

    #[test]
    fn round_trips_a_signaled_kill() {
        let status = encode_signaled(11);
        assert!(signaled(status));
        assert!(!exited(status));
        assert_eq!(term_signal(status), 11);
    }
}
