//! Kernel logging: a [`log`] facade over a single global logger.
//!
//! Mirrors the split the rest of this codebase's family draws between raw
//! console output and a typed logger — `print!`/`println!`-style output is
//! collaborator territory (console write is one of the six primitives in
//! §1), while this module is the structured side: `log::{debug,info,warn,
//! error}!` call sites throughout `process`/`mm`/`intersection` go through
//! one global logger installed once at bootstrap.
//!
//! On bare metal the installed logger writes formatted lines straight to
//! the console collaborator. On the host target, where most of this crate
//! is actually exercised, tests install a small buffering logger instead so
//! assertions can inspect what got logged without a real console.

use core::fmt::Write;

use crate::collaborators::{Collaborators, ConsoleHandle};

/// Logger that formats each record and writes it to a console handle
/// opened once at bootstrap.
pub struct ConsoleLogger {
    collaborators: alloc::sync::Arc<dyn Collaborators>,
    console: ConsoleHandle,
    level: log::LevelFilter,
}

impl ConsoleLogger {
    pub fn new(
        collaborators: alloc::sync::Arc<dyn Collaborators>,
        console: ConsoleHandle,
        level: log::LevelFilter,
    ) -> Self {
        Self {
            collaborators,
            console,
            level,
        }
    }
}

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut line = Line::new();
        // A formatting failure here would mean the fixed-size buffer
        // overflowed; truncate rather than panic, since logging must never
        // be what brings the kernel down.
        let _ = write!(line, "[{}] {}: {}", record.level(), record.target(), record.args());
        self.collaborators.console_write(self.console, line.as_str());
    }

    fn flush(&self) {}
}

/// Fixed-capacity line buffer, so formatting a log record never touches
/// the heap allocator — logging must keep working even when `ENOMEM` is
/// the very thing being reported.
const LINE_CAPACITY: usize = 256;

struct Line {
    buf: [u8; LINE_CAPACITY],
    len: usize,
}

impl Line {
    fn new() -> Self {
        Self {
            buf: [0; LINE_CAPACITY],
            len: 0,
        }
    }

    fn as_str(&self) -> &str {
        core::str::from_utf8(&self.buf[..self.len]).unwrap_or("<non-utf8 log line>")
    }
}

impl Write for Line {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        let remaining = LINE_CAPACITY - self.len;
        let take = core::cmp::min(remaining, bytes.len());
        self.buf[self.len..self.len + take].copy_from_slice(&bytes[..take]);
        self.len += take;
        Ok(())
    }
}

/// Install `logger` as the global `log` backend. Bootstrap calls this
/// exactly once; a second call is a programming error and is reported by
/// `log::set_logger`'s own `Err`, not panicked on here, since a hosted test
/// process may run many `#[test]`s that each try to install a logger.
pub fn install(logger: &'static dyn log::Log, level: log::LevelFilter) {
    if log::set_logger(logger).is_ok() {
        log::set_max_level(level);
    }
}

/// Build and install a [`ConsoleLogger`] for the rest of this process's
/// lifetime. `Kernel::bootstrap` calls this on the bare-metal target,
/// where a kernel never tears its logger down, so leaking the one
/// allocation is the right lifetime rather than a leak bug.
#[cfg(target_os = "none")]
pub fn install_console_logger(
    collaborators: alloc::sync::Arc<dyn Collaborators>,
    console: ConsoleHandle,
    level: log::LevelFilter,
) {
    let logger: &'static ConsoleLogger =
        alloc::boxed::Box::leak(alloc::boxed::Box::new(ConsoleLogger::new(collaborators, console, level)));
    install(logger, level);
}

/// A host-only logger that appends formatted lines to a shared `Vec`
/// instead of a console, so tests can assert on what was logged.
#[cfg(any(test, feature = "testing"))]
pub mod fake {
    use alloc::format;
    use alloc::string::String;
    use alloc::vec::Vec;

    use crate::sync::SpinLock;

    pub struct BufferingLogger {
        lines: SpinLock<Vec<String>>,
    }

    impl BufferingLogger {
        pub const fn new() -> Self {
            Self {
                lines: SpinLock::new(Vec::new()),
            }
        }

        pub fn lines(&self) -> Vec<String> {
            self.lines.lock().clone()
        }
    }

    impl Default for BufferingLogger {
        fn default() -> Self {
            Self::new()
        }
    }

    impl log::Log for BufferingLogger {
        fn enabled(&self, _metadata: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            self.lines
                .lock()
                .push(format!("[{}] {}: {}", record.level(), record.target(), record.args()));
        }

        fn flush(&self) {}
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn records_formatted_lines() {
            let logger = BufferingLogger::new();
            log::Log::log(
                &logger,
                &log::Record::builder()
                    .level(log::Level::Info)
                    .target("test")
                    .args(format_args!("hello {}", 1))
                    .build(),
            );
            assert_eq!(logger.lines(), alloc::vec![String::from("[INFO] test: hello 1")]);
        }
    }
}
